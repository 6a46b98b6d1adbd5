//! Supported document formats

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Supported file types
///
/// The set is closed: adding a format means adding a variant here and a
/// parser arm in `ingestion::parser`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// PDF document
    Pdf,
    /// Microsoft Word document (.docx)
    Docx,
    /// Microsoft PowerPoint presentation (.pptx)
    Pptx,
    /// Excel workbook (.xlsx)
    Xlsx,
    /// Comma-separated table
    Csv,
    /// Markdown file
    Markdown,
    /// Jupyter notebook (.ipynb)
    Notebook,
    /// PNG raster image
    Png,
    /// JPEG raster image
    Jpeg,
    /// HTML document
    Html,
}

impl FileType {
    /// All supported types
    pub const ALL: [FileType; 10] = [
        Self::Pdf,
        Self::Docx,
        Self::Pptx,
        Self::Xlsx,
        Self::Csv,
        Self::Markdown,
        Self::Notebook,
        Self::Png,
        Self::Jpeg,
        Self::Html,
    ];

    /// Resolve a declared extension (with or without leading dot)
    pub fn from_extension(ext: &str) -> Result<Self> {
        let normalized = ext.trim().trim_start_matches('.').to_lowercase();
        match normalized.as_str() {
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            "pptx" => Ok(Self::Pptx),
            "xlsx" => Ok(Self::Xlsx),
            "csv" => Ok(Self::Csv),
            "md" | "markdown" => Ok(Self::Markdown),
            "ipynb" => Ok(Self::Notebook),
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "html" | "htm" => Ok(Self::Html),
            other => Err(Error::UnsupportedFormat(if other.is_empty() {
                "missing file extension".to_string()
            } else {
                format!(".{}", other)
            })),
        }
    }

    /// Resolve from a filename such as `report.PDF`
    pub fn from_filename(filename: &str) -> Result<Self> {
        match filename.rsplit_once('.') {
            Some((_, ext)) => Self::from_extension(ext),
            None => Self::from_extension(""),
        }
    }

    /// Canonical extension
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Pptx => "pptx",
            Self::Xlsx => "xlsx",
            Self::Csv => "csv",
            Self::Markdown => "md",
            Self::Notebook => "ipynb",
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Html => "html",
        }
    }

    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Docx => "Word Document (.docx)",
            Self::Pptx => "PowerPoint (.pptx)",
            Self::Xlsx => "Excel Workbook (.xlsx)",
            Self::Csv => "CSV",
            Self::Markdown => "Markdown",
            Self::Notebook => "Jupyter Notebook",
            Self::Png => "PNG Image",
            Self::Jpeg => "JPEG Image",
            Self::Html => "HTML",
        }
    }

    /// MIME type of the source file
    pub fn mime_type(&self) -> String {
        mime_guess::from_ext(self.extension())
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }

    /// Whether the format carries page, slide or sheet numbers of its own
    pub fn has_native_positions(&self) -> bool {
        matches!(self, Self::Pdf | Self::Pptx | Self::Xlsx | Self::Csv)
    }

    /// Whether the format is a raster image
    pub fn is_image(&self) -> bool {
        matches!(self, Self::Png | Self::Jpeg)
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_extension() {
        assert_eq!(FileType::from_extension("pdf").unwrap(), FileType::Pdf);
        assert_eq!(FileType::from_extension(".JPEG").unwrap(), FileType::Jpeg);
        assert_eq!(FileType::from_extension("jpg").unwrap(), FileType::Jpeg);
        assert_eq!(FileType::from_extension("ipynb").unwrap(), FileType::Notebook);
        assert_eq!(FileType::from_filename("Notes.MD").unwrap(), FileType::Markdown);
    }

    #[test]
    fn test_rejects_unknown_extensions() {
        assert!(matches!(
            FileType::from_extension(".exe"),
            Err(Error::UnsupportedFormat(_))
        ));
        assert!(matches!(
            FileType::from_filename("README"),
            Err(Error::UnsupportedFormat(_))
        ));
        assert!(matches!(
            FileType::from_extension("txt"),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_extension_round_trip() {
        for file_type in FileType::ALL {
            assert_eq!(FileType::from_extension(file_type.extension()).unwrap(), file_type);
        }
    }

    #[test]
    fn test_mime_types() {
        assert_eq!(FileType::Pdf.mime_type(), "application/pdf");
        assert_eq!(FileType::Png.mime_type(), "image/png");
    }
}
