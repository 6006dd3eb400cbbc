//! Opening a GGPK archive stored inside the bundle system.

use std::io::Cursor;

use super::ggpk::Ggpk;
use super::index::Index;
use super::Error;

/// Locate `path_in_bundle` in the index, extract its bytes out of the data
/// bundle and open them as a GGPK archive. The returned reader owns the
/// extracted buffer; dropping it releases the memory.
pub fn open(index: &mut Index, path_in_bundle: &str) -> Result<Ggpk<Cursor<Vec<u8>>>, Error> {
    if path_in_bundle.is_empty() {
        return Err(Error::NotFound("empty bundle path".to_owned()));
    }
    let record = index.get_file_by_path(path_in_bundle)?;
    let data = index.read_file_data(&record)?;
    if data.is_empty() {
        return Err(Error::CorruptRecord {
            offset: 0,
            reason: "bundled archive has no content",
        });
    }
    Ggpk::open_from_memory(data)
}
