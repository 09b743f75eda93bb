//! iCloud calendar access.
//!
//! iCloud speaks plain CalDAV with app-specific passwords, so the adapter is
//! the generic [`CaldavAdapter`] registered under its own provider kind with
//! the iCloud entry point preset. iCloud redirects to per-user servers
//! (`pXX-caldav.icloud.com`) after the first request.

use calsync_core::ProviderKind;

use crate::caldav::CaldavAdapter;

pub const ICLOUD_CALDAV_URL: &str = "https://caldav.icloud.com";

/// The adapter serving `ProviderKind::Icloud`.
pub fn adapter() -> CaldavAdapter {
    CaldavAdapter::with_defaults(ProviderKind::Icloud, ICLOUD_CALDAV_URL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ProviderAdapter;

    #[test]
    fn registers_under_the_icloud_kind() {
        assert_eq!(adapter().kind(), ProviderKind::Icloud);
        assert!(adapter().supports_write());
    }
}
