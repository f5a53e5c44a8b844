//! Checks what the driver granted against what was asked for.
//!
//! Legacy creation paths (GLX `glXCreateNewContext`, plain
//! `wglCreateContext`) cannot express a version, so a backend may hand back
//! an older context than requested. This is the single place that refuses
//! such a context instead of letting it through.

use crate::attributes::{ContextAttributes, Profile};
use crate::context::{ContextInfo, NegotiatedVersion};
use crate::error::ContextError;
use crate::render::VersionReport;

/// Validates `granted` against `requested` and records the negotiated
/// version in `info`.
///
/// # Errors
///
/// Returns `ContextError::Negotiation` when the API family differs, the
/// granted version is lower than requested, a compatibility request was
/// answered with a core-only profile, or a version was already recorded.
pub fn accept_version(
    requested: &ContextAttributes,
    granted: &VersionReport,
    info: &mut ContextInfo,
) -> Result<NegotiatedVersion, ContextError> {
    let wanted = requested.version();
    if granted.gles != requested.gles {
        return Err(ContextError::negotiation(
            format!(
                "requested {} {wanted} but the driver granted {} {}",
                requested.api().label(),
                if granted.gles { "GLES" } else { "OpenGL" },
                granted.version
            ),
            None,
        ));
    }
    if granted.version < wanted {
        return Err(ContextError::negotiation(
            format!(
                "requested {} {wanted} but the driver granted only {}",
                requested.api().label(),
                granted.version
            ),
            None,
        ));
    }
    if requested.requested_profile() == Some(Profile::Compatibility)
        && granted.profile == Some(Profile::Core)
    {
        return Err(ContextError::negotiation(
            format!(
                "requested a compatibility profile but the driver granted core {}",
                granted.version
            ),
            None,
        ));
    }

    let negotiated = NegotiatedVersion {
        version: granted.version,
        gles: granted.gles,
    };
    info.set_negotiated(negotiated)?;
    log::info!(
        "negotiated {} {} (requested {wanted})",
        requested.api().label(),
        granted.version
    );
    Ok(negotiated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::GlVersion;
    use crate::error::ErrorKind;

    fn report(major: u32, minor: u32, gles: bool, profile: Option<Profile>) -> VersionReport {
        VersionReport {
            version: GlVersion::new(major, minor),
            gles,
            profile,
            forward_compatible: None,
            debug: None,
            version_string: String::new(),
            vendor: String::new(),
            renderer: String::new(),
            shading_language: String::new(),
        }
    }

    fn attrs(major: u32, minor: u32, gles: bool, profile: Profile) -> ContextAttributes {
        ContextAttributes {
            major,
            minor,
            gles,
            profile,
            ..Default::default()
        }
    }

    #[test]
    fn higher_version_is_accepted_and_recorded() {
        let mut info = ContextInfo::new(64, 64);
        let got = accept_version(
            &attrs(3, 0, false, Profile::Core),
            &report(4, 6, false, Some(Profile::Core)),
            &mut info,
        )
        .unwrap();
        assert_eq!(got.version, GlVersion::new(4, 6));
        assert_eq!(info.negotiated(), Some(got));
    }

    #[test]
    fn silent_downgrade_is_rejected() {
        let mut info = ContextInfo::new(64, 64);
        let err = accept_version(
            &attrs(4, 5, false, Profile::Core),
            &report(2, 1, false, None),
            &mut info,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Negotiation);
        assert!(err.to_string().contains("2.1"), "{err}");
        assert!(info.negotiated().is_none());
    }

    #[test]
    fn absurd_version_request_is_a_negotiation_failure() {
        let mut info = ContextInfo::new(1, 1);
        let err = accept_version(
            &attrs(99, 0, false, Profile::Compatibility),
            &report(4, 6, false, Some(Profile::Compatibility)),
            &mut info,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Negotiation);
    }

    #[test]
    fn api_mismatch_is_rejected() {
        let mut info = ContextInfo::new(1, 1);
        assert!(accept_version(
            &attrs(2, 0, true, Profile::Compatibility),
            &report(4, 6, false, None),
            &mut info,
        )
        .is_err());
    }

    #[test]
    fn compatibility_answered_with_core_is_rejected() {
        let mut info = ContextInfo::new(1, 1);
        assert!(accept_version(
            &attrs(3, 3, false, Profile::Compatibility),
            &report(3, 3, false, Some(Profile::Core)),
            &mut info,
        )
        .is_err());
    }

    #[test]
    fn gles_ignores_profile() {
        let mut info = ContextInfo::new(1, 1);
        assert!(accept_version(
            &attrs(3, 0, true, Profile::Compatibility),
            &report(3, 2, true, Some(Profile::Core)),
            &mut info,
        )
        .is_ok());
    }

    #[test]
    fn second_acceptance_is_refused() {
        let mut info = ContextInfo::new(1, 1);
        let a = attrs(2, 1, false, Profile::Compatibility);
        let r = report(2, 1, false, None);
        accept_version(&a, &r, &mut info).unwrap();
        assert!(accept_version(&a, &r, &mut info).is_err());
    }
}
