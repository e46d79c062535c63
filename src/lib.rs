//! # faceauth (Face-Auth IdP client shell)
//!
//! `faceauth` sequences the client side of a face-authentication identity
//! provider: camera capture, a liveness check delegated to an external widget,
//! and one backend authentication call per flow. Face matching, ID card OCR and
//! anti-spoofing all happen behind the backend API; this crate only moves
//! opaque image and session payloads across that boundary.
//!
//! ## Flows
//!
//! | Flow | Steps |
//! |------|-------|
//! | Login | liveness, face, submit |
//! | Enrollment | ID card, liveness, face, submit |
//! | Emergency | ID card, password, liveness, submit |
//! | Re-Enrollment | ID card, face, submit |
//!
//! A failed submission always returns the flow to its first step with every
//! captured artifact dropped. Login offers the emergency flow after two
//! consecutive failures.
//!
//! ## Edge gate
//!
//! The `edge` module decides whether a viewer may reach the application at all,
//! using a static IPv4 CIDR allow-list. `faceauth gate` serves the single-page
//! application behind that check.

pub mod api;
pub mod camera;
pub mod cli;
pub mod edge;
pub mod flow;
pub mod liveness;
pub mod shell;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
