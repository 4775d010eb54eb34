use std::fs::{self, File};
use std::path::Path;

use zip::ZipArchive;

use crate::app::models::ApkInfo;

const MANIFEST_ENTRY: &str = "AndroidManifest.xml";

/// Sanity check for a pulled apk: readable zip with a manifest entry.
/// Problems are reported in `error` rather than as a failure.
pub fn inspect_apk(path: &Path) -> ApkInfo {
    let mut info = ApkInfo {
        path: path.to_string_lossy().to_string(),
        file_size_bytes: 0,
        is_valid_archive: false,
        has_manifest: false,
        error: None,
    };

    if !path.is_file() {
        info.error = Some(format!("File not found: {}", path.display()));
        return info;
    }
    if let Ok(metadata) = fs::metadata(path) {
        info.file_size_bytes = metadata.len();
    }

    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            info.error = Some(format!("Failed to open APK: {err}"));
            return info;
        }
    };
    match ZipArchive::new(file) {
        Ok(archive) => {
            info.is_valid_archive = true;
            info.has_manifest = archive.file_names().any(|name| name == MANIFEST_ENTRY);
            if !info.has_manifest {
                info.error = Some(format!("{MANIFEST_ENTRY} missing"));
            }
        }
        Err(err) => {
            info.error = Some(format!("Invalid APK: {err}"));
        }
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::FileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).expect("create");
        let mut zip = zip::ZipWriter::new(file);
        for (name, body) in entries {
            zip.start_file(*name, FileOptions::<()>::default()).unwrap();
            zip.write_all(body).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn accepts_apk_with_manifest() {
        let tmp = TempDir::new().expect("tmp");
        let apk = tmp.path().join("com.foo.apk");
        write_zip(&apk, &[("AndroidManifest.xml", b"<manifest/>"), ("classes.dex", b"dex")]);

        let info = inspect_apk(&apk);
        assert!(info.is_valid_archive);
        assert!(info.has_manifest);
        assert!(info.file_size_bytes > 0);
        assert_eq!(info.error, None);
    }

    #[test]
    fn flags_zip_without_manifest() {
        let tmp = TempDir::new().expect("tmp");
        let apk = tmp.path().join("odd.apk");
        write_zip(&apk, &[("readme.txt", b"hi")]);

        let info = inspect_apk(&apk);
        assert!(info.is_valid_archive);
        assert!(!info.has_manifest);
        assert!(info.error.unwrap().contains("AndroidManifest.xml"));
    }

    #[test]
    fn flags_non_zip_and_missing_files() {
        let tmp = TempDir::new().expect("tmp");
        let junk = tmp.path().join("junk.apk");
        fs::write(&junk, b"not a zip").unwrap();
        assert!(!inspect_apk(&junk).is_valid_archive);

        let missing = inspect_apk(&tmp.path().join("missing.apk"));
        assert!(missing.error.unwrap().starts_with("File not found"));
    }
}
