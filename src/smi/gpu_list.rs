use serde::Serialize;
use tracing::debug;

// GPU identity as listed by "nvidia-smi -L"
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GpuIdentity {
    pub index: u32,
    pub name: String,
    pub uuid: Option<String>,
}

/// Parse the identity listing, one `GPU <n>: <name> (UUID: <uuid>)`
/// entry per line.
///
/// Lines of any other shape are skipped, this covers the indented
/// MIG device entries newer drivers print under their parent GPU.
pub fn parse_gpu_list(listing: &str) -> Vec<GpuIdentity> {
    listing
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let identity = parse_line(line);

            if identity.is_none() {
                debug!("Skipping GPU list line: {line:?}");
            }

            identity
        })
        .collect()
}

fn parse_line(line: &str) -> Option<GpuIdentity> {
    let rest = line.strip_prefix("GPU ")?;
    let (index, rest) = rest.split_once(':')?;
    let index = index.trim().parse().ok()?;

    let rest = rest.trim();

    // Strip the trailing parenthesised identifiers
    let (name, uuid) = match rest.rfind(" (") {
        Some(start) if rest.ends_with(')') && rest[start..].contains(':') => {
            let ids = &rest[start + 2..rest.len() - 1];
            let uuid = ids
                .split(',')
                .find_map(|id| id.trim().strip_prefix("UUID:"))
                .map(|uuid| uuid.trim().to_string());

            (&rest[..start], uuid)
        }
        _ => (rest, None),
    };

    Some(GpuIdentity {
        index,
        name: name.trim().to_string(),
        uuid,
    })
}
