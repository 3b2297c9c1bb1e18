//! Picks the Radarr/Sonarr server that owns a catalog entry

use tracing::warn;

use crate::db::MediaRecord;
use crate::services::servarr::ServarrSettings;

/// Select the server for `record` from the servers configured for its media type.
///
/// The default server of the record's variant (4K or standard) is the
/// baseline. A non-negative `service_id` on the record overrides it, looked up
/// among servers of the same variant. `None` means the record has no server
/// and should be left alone.
pub fn resolve<'a>(
    record: &MediaRecord,
    servers: &'a [ServarrSettings],
) -> Option<&'a ServarrSettings> {
    let is_4k = record.is_4k();

    let mut selected = servers.iter().find(|s| s.is_default && s.is_4k == is_4k);

    if let Some(service_id) = record.service_id.filter(|id| *id >= 0)
        && selected.map(|s| s.id) != Some(service_id)
    {
        selected = servers
            .iter()
            .find(|s| s.id == service_id && s.is_4k == is_4k);
    }

    if selected.is_none() {
        warn!(
            media_id = record.id,
            media_type = %record.media_type,
            is_4k = is_4k,
            service_id = ?record.service_id,
            "No {} server configured for this media, skipping",
            if is_4k { "4K" } else { "non-4K" }
        );
    }

    selected
}
