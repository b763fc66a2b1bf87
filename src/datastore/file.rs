use std::fs;
use std::path::Path;

use super::StoreState;
use crate::error::{Result, StrongboxError};

const FORMAT_VERSION: u32 = 1;

#[derive(serde::Serialize)]
struct DiskImageRef<'a> {
    format_version: u32,
    state: &'a StoreState,
}

#[derive(serde::Deserialize)]
struct DiskImage {
    format_version: u32,
    state: StoreState,
}

/// Read a store image. Stored values are ciphertext already; the image
/// itself is plain MessagePack.
pub fn load(path: &Path) -> Result<StoreState> {
    let bytes = fs::read(path)?;
    let image: DiskImage =
        rmp_serde::from_slice(&bytes).map_err(|e| StrongboxError::Serialization(e.to_string()))?;
    if image.format_version != FORMAT_VERSION {
        return Err(StrongboxError::Serialization(format!(
            "unsupported store format version {} in {}",
            image.format_version,
            path.display()
        )));
    }
    let mut state = image.state;
    state.rebuild_indexes();
    Ok(state)
}

/// Write the store image with atomic rename.
pub fn save(path: &Path, state: &StoreState) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }

    let bytes = rmp_serde::to_vec_named(&DiskImageRef {
        format_version: FORMAT_VERSION,
        state,
    })
    .map_err(|e| StrongboxError::Serialization(e.to_string()))?;

    let tmp_path = path.with_extension("db.tmp");
    fs::write(&tmp_path, &bytes)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
    }
    fs::rename(&tmp_path, path)?;

    Ok(())
}
