//! Import requests and payload assembly
//!
//! Files are matched to multipart fields by case-insensitive extension.
//! Validation happens here, before the backend is ever called.

use std::path::{Path, PathBuf};

use crate::backend::{ImportFormat, ImportPayload, PayloadFile};
use crate::error::ImportError;

/// EPSG code sent for GeoJSON and Shapefile imports when none is given
pub const DEFAULT_EPSG: u32 = 3857;
pub const DEFAULT_ENCODING: &str = "UTF-8";

/// Shapefile bundle parts; extension and multipart field name are the same
const SHAPEFILE_PARTS: [&str; 6] = ["shp", "shx", "dbf", "prj", "cpg", "qpj"];

/// One file chosen for import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ImportFile {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    pub async fn from_path(path: &Path) -> Result<Self, ImportError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ImportError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { file_name, bytes })
    }

    /// Lowercased extension without the dot
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
    }

    fn has_extension(&self, accepted: &[&str]) -> bool {
        self.extension()
            .is_some_and(|ext| accepted.contains(&ext.as_str()))
    }
}

/// Layer import as the user describes it
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub format: ImportFormat,
    pub layer_name: String,
    /// Client id of the target group; root when unset
    pub parent: Option<String>,
    pub epsg: Option<u32>,
    pub encoding: Option<String>,
    pub files: Vec<ImportFile>,
}

impl ImportRequest {
    pub fn new(format: ImportFormat, layer_name: impl Into<String>, files: Vec<ImportFile>) -> Self {
        Self {
            format,
            layer_name: layer_name.into(),
            parent: None,
            epsg: None,
            encoding: None,
            files,
        }
    }

    pub fn with_parent(mut self, group_id: impl Into<String>) -> Self {
        self.parent = Some(group_id.into());
        self
    }

    pub fn with_epsg(mut self, epsg: u32) -> Self {
        self.epsg = Some(epsg);
        self
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    /// Read every path from disk
    pub async fn from_paths(
        format: ImportFormat,
        layer_name: impl Into<String>,
        paths: &[PathBuf],
    ) -> Result<Self, ImportError> {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            files.push(ImportFile::from_path(path).await?);
        }
        Ok(Self::new(format, layer_name, files))
    }

    /// Validate and assemble the multipart payload
    ///
    /// `parent_name` is the backend name of the target group (`""` = root).
    pub fn into_payload(
        self,
        project: &str,
        parent_name: String,
    ) -> Result<ImportPayload, ImportError> {
        let layer_name = self.layer_name.trim().to_string();
        if layer_name.is_empty() {
            return Err(ImportError::EmptyLayerName);
        }

        let format = self.format;
        let (files, epsg, encoding) = match format {
            ImportFormat::Shapefile => (
                shapefile_parts(self.files)?,
                Some(self.epsg.unwrap_or(DEFAULT_EPSG)),
                Some(self.encoding.unwrap_or_else(|| DEFAULT_ENCODING.to_string())),
            ),
            ImportFormat::GeoJson => (
                vec![single_file(self.files, "GeoJSON", &["geojson", "json"], "geojson")?],
                Some(self.epsg.unwrap_or(DEFAULT_EPSG)),
                Some(self.encoding.unwrap_or_else(|| DEFAULT_ENCODING.to_string())),
            ),
            ImportFormat::Gml => (
                vec![single_file(self.files, "GML", &["gml", "xml"], "gml")?],
                self.epsg,
                None,
            ),
            ImportFormat::GeoTiff => (
                vec![single_file(self.files, "GeoTIFF", &["tif", "tiff"], "tif")?],
                None,
                None,
            ),
        };

        tracing::debug!(
            format = %format,
            layer = %layer_name,
            files = files.len(),
            "assembled import payload"
        );

        Ok(ImportPayload {
            format,
            project: project.to_string(),
            layer_name,
            parent: parent_name,
            epsg,
            encoding,
            files,
        })
    }
}

fn single_file(
    files: Vec<ImportFile>,
    format: &'static str,
    accepted: &[&str],
    field: &'static str,
) -> Result<PayloadFile, ImportError> {
    let first_name = files.first().map(|f| f.file_name.clone());
    let file = files
        .into_iter()
        .find(|f| f.has_extension(accepted))
        .ok_or_else(|| match first_name {
            Some(file) => ImportError::UnsupportedFile { format, file },
            None => ImportError::MissingFile(format),
        })?;
    Ok(PayloadFile {
        field,
        file_name: file.file_name,
        bytes: file.bytes,
    })
}

fn shapefile_parts(files: Vec<ImportFile>) -> Result<Vec<PayloadFile>, ImportError> {
    let mut parts = Vec::new();
    let mut remaining = files;
    for field in SHAPEFILE_PARTS {
        if let Some(pos) = remaining.iter().position(|f| f.has_extension(&[field])) {
            let file = remaining.remove(pos);
            parts.push(PayloadFile {
                field,
                file_name: file.file_name,
                bytes: file.bytes,
            });
        }
    }

    if !parts.iter().any(|p| p.field == "shp") {
        return Err(ImportError::MissingPrimaryFile);
    }
    if !remaining.is_empty() {
        tracing::debug!(
            ignored = ?remaining.iter().map(|f| f.file_name.as_str()).collect::<Vec<_>>(),
            "shapefile sidecars not sent"
        );
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(names: &[&str]) -> Vec<ImportFile> {
        names
            .iter()
            .map(|n| ImportFile::new(*n, n.as_bytes().to_vec()))
            .collect()
    }

    #[test]
    fn test_shapefile_bundle_fields() {
        let request = ImportRequest::new(
            ImportFormat::Shapefile,
            "parcels",
            bundle(&["parcels.shp", "parcels.shx", "parcels.dbf", "parcels.prj"]),
        );
        let payload = request.into_payload("demo", String::new()).unwrap();

        let fields: Vec<_> = payload.files.iter().map(|f| f.field).collect();
        assert_eq!(fields, ["shp", "shx", "dbf", "prj"]);
        assert_eq!(payload.file("dbf").unwrap().file_name, "parcels.dbf");
        assert_eq!(payload.epsg, Some(DEFAULT_EPSG));
        assert_eq!(payload.encoding.as_deref(), Some("UTF-8"));
    }

    #[test]
    fn test_extension_match_ignores_case() {
        let request = ImportRequest::new(
            ImportFormat::Shapefile,
            "roads",
            bundle(&["ROADS.SHP", "roads.Dbf", "roads.cpg", "roads.qix"]),
        )
        .with_epsg(2180);
        let payload = request.into_payload("demo", "Base".into()).unwrap();
        let fields: Vec<_> = payload.files.iter().map(|f| f.field).collect();
        assert_eq!(fields, ["shp", "dbf", "cpg"]);
        assert_eq!(payload.epsg, Some(2180));
        assert_eq!(payload.parent, "Base");
    }

    #[test]
    fn test_missing_primary_file() {
        let request = ImportRequest::new(
            ImportFormat::Shapefile,
            "parcels",
            bundle(&["parcels.shx", "parcels.dbf", "parcels.prj"]),
        );
        assert!(matches!(
            request.into_payload("demo", String::new()),
            Err(ImportError::MissingPrimaryFile)
        ));
    }

    #[test]
    fn test_empty_layer_name() {
        let request = ImportRequest::new(ImportFormat::GeoJson, "  ", bundle(&["a.geojson"]));
        assert!(matches!(
            request.into_payload("demo", String::new()),
            Err(ImportError::EmptyLayerName)
        ));
    }

    #[test]
    fn test_single_file_formats() {
        let tif = ImportRequest::new(ImportFormat::GeoTiff, "ortho", bundle(&["ortho.TIF"]))
            .with_epsg(2180)
            .into_payload("demo", String::new())
            .unwrap();
        assert_eq!(tif.files[0].field, "tif");
        assert_eq!(tif.epsg, None);

        let gml = ImportRequest::new(ImportFormat::Gml, "plots", bundle(&["plots.gml"]))
            .into_payload("demo", String::new())
            .unwrap();
        assert_eq!(gml.files[0].field, "gml");
        assert_eq!(gml.epsg, None);
        assert_eq!(gml.encoding, None);

        let err = ImportRequest::new(ImportFormat::GeoJson, "x", bundle(&["x.csv"]))
            .into_payload("demo", String::new())
            .unwrap_err();
        assert!(matches!(err, ImportError::UnsupportedFile { format: "GeoJSON", .. }));

        let err = ImportRequest::new(ImportFormat::Gml, "x", vec![])
            .into_payload("demo", String::new())
            .unwrap_err();
        assert!(matches!(err, ImportError::MissingFile("GML")));
    }

    #[tokio::test]
    async fn test_from_paths_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        let shp = dir.path().join("parcels.shp");
        let dbf = dir.path().join("parcels.dbf");
        tokio::fs::write(&shp, b"shape").await.unwrap();
        tokio::fs::write(&dbf, b"table").await.unwrap();

        let request = ImportRequest::from_paths(ImportFormat::Shapefile, "parcels", &[shp, dbf])
            .await
            .unwrap();
        let payload = request.into_payload("demo", String::new()).unwrap();
        assert_eq!(payload.file("shp").unwrap().bytes, b"shape");

        let missing = dir.path().join("nope.shp");
        let err = ImportRequest::from_paths(ImportFormat::Shapefile, "x", &[missing])
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::Read { .. }));
    }
}
