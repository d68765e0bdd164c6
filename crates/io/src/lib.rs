// Model output: the spreadsheet itself and a JSON dump of the same content

use std::path::Path;

pub mod json;
pub mod xlsx;

/// Write `bytes` to `path`; on failure nothing is left at `path`.
pub fn write_file(path: &Path, bytes: &[u8]) -> Result<(), String> {
    if let Err(e) = std::fs::write(path, bytes) {
        let _ = std::fs::remove_file(path);
        return Err(format!("Failed to write {}: {}", path.display(), e));
    }
    Ok(())
}

/// Write every rendered output, or none: when one write fails the files
/// already written by this call are removed again.
pub fn write_all(outputs: &[(&Path, &[u8])]) -> Result<(), String> {
    for (i, (path, bytes)) in outputs.iter().enumerate() {
        if let Err(e) = write_file(path, bytes) {
            for (written, _) in &outputs[..i] {
                let _ = std::fs::remove_file(written);
            }
            return Err(e);
        }
    }
    Ok(())
}
