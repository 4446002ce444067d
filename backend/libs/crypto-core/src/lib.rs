//! Session token primitives shared by IssueHub services.
//!
//! - `jwt`: signed, time-bounded session tokens carrying identity claims

pub mod jwt;

pub use jwt::{CodecError, DecodeFailure, DecodedSession, SessionClaims, SessionTokenCodec};
