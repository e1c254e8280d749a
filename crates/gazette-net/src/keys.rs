//! Node identity persistence.
//!
//! The long-lived node keypair lives at a fixed path (`<data>/node.key`),
//! protobuf-marshalled, file mode 0600. Created once on first run and
//! never mutated afterwards.

use std::path::Path;

use libp2p::identity::Keypair;
use tracing::info;

pub fn load_or_generate_keypair(path: &Path) -> anyhow::Result<Keypair> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if path.exists() {
        let data = std::fs::read(path)?;
        let keypair = Keypair::from_protobuf_encoding(&data)?;
        info!(path = %path.display(), "loaded node identity");
        return Ok(keypair);
    }

    let keypair = Keypair::generate_ed25519();
    let data = keypair.to_protobuf_encoding()?;
    std::fs::write(path, data)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    info!(path = %path.display(), "generated new node identity");
    Ok(keypair)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_then_reloads_same_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.key");

        let first = load_or_generate_keypair(&path).unwrap();
        let second = load_or_generate_keypair(&path).unwrap();
        assert_eq!(
            first.public().to_peer_id(),
            second.public().to_peer_id()
        );
    }

    #[cfg(unix)]
    #[test]
    fn key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.key");
        load_or_generate_keypair(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
