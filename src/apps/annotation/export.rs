use crate::ui::card::AnnotatorItem;
use csv::WriterBuilder;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

pub const CSV_HEADER: [&str; 5] = ["tag", "x1", "y1", "x2", "y2"];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("cannot encode annotations: {0}")]
    Csv(#[from] csv::Error),

    #[error("annotations are not valid utf-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExportError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One row per box with coordinates rounded to whole pixels.
pub fn to_csv(items: &[AnnotatorItem]) -> Result<String, ExportError> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for item in items {
        writer.write_record([
            item.tag.clone(),
            item.x1.round().to_string(),
            item.y1.round().to_string(),
            item.x2.round().to_string(),
            item.y2.round().to_string(),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| csv::Error::from(err.into_error()))?;
    Ok(String::from_utf8(bytes)?)
}

/// Writes through a temporary sibling and renames it into place.
pub async fn save_csv(path: &Path, items: &[AnnotatorItem]) -> Result<(), ExportError> {
    let contents = to_csv(items)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|err| ExportError::io(parent, err))?;
    }
    let tmp_path = path.with_extension("csv.tmp");
    fs::write(&tmp_path, contents)
        .await
        .map_err(|err| ExportError::io(&tmp_path, err))?;
    if let Err(rename_err) = fs::rename(&tmp_path, path).await {
        if !fs::try_exists(path).await.unwrap_or(false) {
            return Err(ExportError::io(path, rename_err));
        }
        fs::remove_file(path)
            .await
            .map_err(|err| ExportError::io(path, err))?;
        fs::rename(&tmp_path, path)
            .await
            .map_err(|err| ExportError::io(path, err))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(tag: &str) -> AnnotatorItem {
        AnnotatorItem {
            tag: tag.to_string(),
            x1: 10.4,
            y1: 20.6,
            x2: 110.0,
            y2: 220.0,
        }
    }

    #[test]
    fn csv_rounds_coordinates_and_quotes_tags() {
        let csv = to_csv(&[item("car"), item("traffic, light")]).expect("csv should encode");
        assert_eq!(
            csv,
            "tag,x1,y1,x2,y2\ncar,10,21,110,220\n\"traffic, light\",10,21,110,220\n"
        );
    }

    #[test]
    fn empty_item_list_still_has_header() {
        assert_eq!(to_csv(&[]).expect("csv should encode"), "tag,x1,y1,x2,y2\n");
    }

    #[test]
    fn tags_with_line_breaks_stay_in_one_field() {
        let csv = to_csv(&[item("stop\rsign"), item("say \"hi\"\nthere")]).expect("csv should encode");
        let mut reader = csv::Reader::from_reader(csv.as_bytes());
        let tags: Vec<String> = reader
            .records()
            .map(|record| record.expect("row should parse")[0].to_string())
            .collect();
        assert_eq!(tags, vec!["stop\rsign".to_string(), "say \"hi\"\nthere".to_string()]);
    }

    #[tokio::test]
    async fn save_replaces_previous_export() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("generated").join("annotations-sample.csv");

        save_csv(&path, &[item("car")]).await.expect("first save should succeed");
        save_csv(&path, &[]).await.expect("second save should succeed");

        assert_eq!(
            std::fs::read_to_string(&path).expect("export should exist"),
            "tag,x1,y1,x2,y2\n"
        );
        assert!(!path.with_extension("csv.tmp").exists());
    }
}
