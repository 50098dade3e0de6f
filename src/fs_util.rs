use std::fs;
use std::io::{BufRead, BufReader, Cursor, Read};

use camino::Utf8Path;
use flate2::read::GzDecoder;
use zip::ZipArchive;

use crate::error::LangualError;

/// Opens a LanguaL release for reading. Accepts the plain XML file, a
/// gzip-compressed copy, or the zip archive LanguaL publishes (the first
/// `.xml` entry is used).
pub fn open_source(path: &Utf8Path) -> Result<Box<dyn BufRead>, LangualError> {
    let source_err = |message: String| LangualError::SourceRead {
        path: path.to_string(),
        message,
    };
    let file = fs::File::open(path.as_std_path()).map_err(|err| source_err(err.to_string()))?;
    let extension = path.extension().map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("gz") => Ok(Box::new(BufReader::new(GzDecoder::new(file)))),
        Some("zip") => {
            let content = read_zip_xml(file).map_err(source_err)?;
            Ok(Box::new(Cursor::new(content)))
        }
        _ => Ok(Box::new(BufReader::new(file))),
    }
}

fn read_zip_xml(file: fs::File) -> Result<Vec<u8>, String> {
    let mut archive = ZipArchive::new(file).map_err(|err| err.to_string())?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|err| err.to_string())?;
        if entry.is_dir() || !entry.name().to_ascii_lowercase().ends_with(".xml") {
            continue;
        }
        let mut content = Vec::new();
        entry
            .read_to_end(&mut content)
            .map_err(|err| err.to_string())?;
        return Ok(content);
    }
    Err("archive contains no .xml entry".to_string())
}
