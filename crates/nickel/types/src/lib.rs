//! Nickel envelope model.
//!
//! A Nickel is the value services exchange over the bus: routing metadata
//! (correlation id, type, origin, principal), an opaque payload, HTTP-style
//! header maps, a tracing carrier and free-form metadata.
//!
//! ## Lifecycle
//!
//! - **create**: fresh correlation id and timestamp, status 200
//! - **derive**: inherits correlation id, timestamp, status and principal
//! - **for_reply / for_error / for_timeout**: derived terminal variants
//!   (RESPONSE, ERROR with 500, TIMEOUT with 504 from the system principal)
//!
//! Every Nickel derived from a request shares its correlation id; that is the
//! only link a waiter has between a request and its reply.

pub mod carrier;
pub mod error;
pub mod kind;
pub mod nickel;
pub mod unpack;

pub use carrier::{CarrierExtractor, CarrierInjector, TracingScope};
pub use error::{NickelError, UnpackError};
pub use kind::{NickelOrigin, NickelType};
pub use nickel::{
    truncate_to_millis, Nickel, NickelParts, APPLICATION_JSON, CONTENT_TYPE, DEFAULT_STATUS,
    ERROR_STATUS, SYSTEM_ORCID, TIMEOUT_STATUS,
};
pub use unpack::Unpack;

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn any_type() -> impl Strategy<Value = NickelType> {
        proptest::sample::select(NickelType::ALL_TYPES.to_vec())
    }

    fn any_origin() -> impl Strategy<Value = NickelOrigin> {
        proptest::sample::select(NickelOrigin::ALL_ORIGINS.to_vec())
    }

    proptest! {
        #[test]
        fn derived_variants_keep_correlation(
            orcid in "[0-9]{4}-[0-9]{4}-[0-9]{4}-[0-9]{4}",
            kind in any_type(),
            origin in any_origin(),
            status in 100u16..600,
        ) {
            let src = Nickel::create_with(orcid, kind, origin).with_status(status);

            prop_assert_eq!(Nickel::for_reply(&src).correlation_id(), src.correlation_id());
            prop_assert_eq!(Nickel::for_reply(&src).status_code(), status);

            let error = Nickel::for_error(&src);
            prop_assert_eq!(error.correlation_id(), src.correlation_id());
            prop_assert_eq!(error.status_code(), ERROR_STATUS);

            let timeout = Nickel::for_timeout(&src);
            prop_assert_eq!(timeout.correlation_id(), src.correlation_id());
            prop_assert_eq!(timeout.status_code(), TIMEOUT_STATUS);
            prop_assert_eq!(timeout.orcid(), Some(SYSTEM_ORCID));
        }
    }
}
