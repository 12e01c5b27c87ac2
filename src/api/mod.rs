//! The narrow contract between the kafka core and the layer that serves it.
//!
//! The boundary extracts the bearer token, turns an optional wire profile
//! into a [`ConnectionProfile`] and renders results as JSON envelopes.
pub mod auth;
pub mod response;

use crate::conf::{ConnectionProfile, KnepConfigError, ProfileOverrides};

/// Merge a caller-supplied profile over the default one. `None` when the
/// caller sent none, so the operation falls back to the default itself.
pub fn caller_profile(
    overrides: Option<&ProfileOverrides>,
    default: &ConnectionProfile,
) -> Option<ConnectionProfile> {
    overrides.map(|overrides| overrides.merge_over(default))
}

/// Same as [`caller_profile`], for operations that need an explicit profile.
pub fn require_profile(
    overrides: Option<&ProfileOverrides>,
    default: &ConnectionProfile,
) -> Result<ConnectionProfile, KnepConfigError> {
    caller_profile(overrides, default).ok_or(KnepConfigError::MissingProfile)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_is_merged_over_the_default() {
        let overrides = ProfileOverrides {
            client_id: Some("test-client".into()),
            ..ProfileOverrides::default()
        };
        let profile = caller_profile(Some(&overrides), &ConnectionProfile::default()).unwrap();
        assert_eq!(profile.client_id, "test-client");
        assert_eq!(profile.bootstrap_addresses, vec!["localhost:19092"]);

        assert!(caller_profile(None, &ConnectionProfile::default()).is_none());
        assert!(matches!(
            require_profile(None, &ConnectionProfile::default()),
            Err(KnepConfigError::MissingProfile)
        ));
    }
}
