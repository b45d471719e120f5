//! The XISF unit: storage model, header, and unit-level metadata.

use chrono::{DateTime, FixedOffset, Utc};

use crate::core_element::CoreElement;
use crate::image::Image;
use crate::property::Property;

/// Standard metadata property identifiers.
pub(crate) mod metadata_ids {
    pub const CREATION_TIME: &str = "XISF:CreationTime";
    pub const CREATOR_APPLICATION: &str = "XISF:CreatorApplication";
    pub const CREATOR_MODULE: &str = "XISF:CreatorModule";
    pub const CREATOR_OS: &str = "XISF:CreatorOS";
    pub const TITLE: &str = "XISF:Title";
    pub const AUTHORS: &str = "XISF:Authors";
    pub const DESCRIPTION: &str = "XISF:Description";
    pub const COPYRIGHT: &str = "XISF:Copyright";
    pub const KEYWORDS: &str = "XISF:Keywords";
}

// ── Storage model ─────────────────────────────────────────────────────────────

/// How a unit's header and data blocks are laid out on storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageModel {
    /// One `.xisf` file: binary framing, XML header, attached blocks.
    Monolithic,
    /// A `.xish` XML header referencing external block resources.
    Distributed {
        header_filename: String,
        data_block_filenames: Vec<String>,
    },
}

// ── Metadata ──────────────────────────────────────────────────────────────────

/// Unit-level metadata, stored as `<Property>` children of `<Metadata>`.
///
/// Creation time and creator application are mandatory; the named optionals
/// map to their standard `XISF:` property identifiers and everything else
/// rides along in `extra`.
#[derive(Clone, Debug, PartialEq)]
pub struct Metadata {
    pub creation_time: DateTime<FixedOffset>,
    pub creator_application: String,
    pub creator_module: Option<String>,
    pub creator_os: Option<String>,
    pub title: Option<String>,
    pub authors: Option<String>,
    pub description: Option<String>,
    pub copyright: Option<String>,
    pub keywords: Option<String>,
    /// Non-standard metadata properties, kept verbatim.
    pub extra: Vec<Property>,
}

impl Metadata {
    /// Metadata stamped with the current time and the host operating system.
    pub fn new(creator_application: impl Into<String>) -> Self {
        Self {
            creation_time: Utc::now().fixed_offset(),
            creator_application: creator_application.into(),
            creator_module: None,
            creator_os: host_os_name().map(str::to_string),
            title: None,
            authors: None,
            description: None,
            copyright: None,
            keywords: None,
            extra: Vec::new(),
        }
    }
}

fn host_os_name() -> Option<&'static str> {
    match std::env::consts::OS {
        "linux" => Some("Linux"),
        "windows" => Some("Windows"),
        "macos" => Some("macOS"),
        "freebsd" => Some("FreeBSD"),
        _ => None,
    }
}

// ── Header ────────────────────────────────────────────────────────────────────

/// Everything the XML header carries: metadata, images, unit-level
/// properties, core elements, and the optional leading comment.
#[derive(Clone, Debug, PartialEq)]
pub struct Header {
    pub metadata: Metadata,
    pub images: Vec<Image>,
    /// Unit-level free properties.
    pub properties: Vec<Property>,
    /// Header-level core elements (shared profiles, keywords, thumbnails…).
    pub core_elements: Vec<CoreElement>,
    /// XML comment preceding the root element, preserved across round-trips.
    pub initial_comment: Option<String>,
}

impl Header {
    pub fn new(metadata: Metadata) -> Self {
        Self {
            metadata,
            images: Vec::new(),
            properties: Vec::new(),
            core_elements: Vec::new(),
            initial_comment: None,
        }
    }

    /// All core elements in the header, including image-associated ones.
    pub(crate) fn all_core_elements(&self) -> impl Iterator<Item = &CoreElement> {
        self.core_elements
            .iter()
            .chain(self.images.iter().flat_map(|image| image.elements.iter()))
    }

    /// Look up a core element by its unique ID.
    pub fn element_by_uid(&self, uid: &str) -> Option<&CoreElement> {
        self.all_core_elements()
            .find(|element| element.uid.as_deref() == Some(uid))
    }
}

// ── Unit ──────────────────────────────────────────────────────────────────────

/// A complete XISF unit.
#[derive(Clone, Debug, PartialEq)]
pub struct Unit {
    pub storage: StorageModel,
    pub header: Header,
    /// Reserved for XML digital signatures. Parsers skip `<Signature>`
    /// content with a warning; writers never emit it.
    pub signature: Option<String>,
}

impl Unit {
    /// A monolithic unit around the given header.
    pub fn monolithic(header: Header) -> Self {
        Self {
            storage: StorageModel::Monolithic,
            header,
            signature: None,
        }
    }

    /// A distributed unit around the given header.
    pub fn distributed(header: Header, header_filename: impl Into<String>) -> Self {
        Self {
            storage: StorageModel::Distributed {
                header_filename: header_filename.into(),
                data_block_filenames: Vec::new(),
            },
            header,
            signature: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_element::{CoreElement, CoreElementKind, ResolutionUnit};
    use crate::image::{ColorSpace, Geometry, Image, SampleFormat};

    #[test]
    fn metadata_new_is_stamped() {
        let metadata = Metadata::new("xisfio test-suite");
        assert_eq!(metadata.creator_application, "xisfio test-suite");
        assert!(metadata.extra.is_empty());
    }

    #[test]
    fn uid_lookup_spans_images() {
        let mut header = Header::new(Metadata::new("app"));
        header.core_elements.push(CoreElement::with_uid(
            "res0",
            CoreElementKind::Resolution {
                horizontal: 72.0,
                vertical: 72.0,
                unit: ResolutionUnit::Inch,
            },
        ));

        let mut image = Image::new(
            Geometry::new(vec![2, 2], 1),
            SampleFormat::UInt8,
            ColorSpace::Gray,
            vec![0; 4],
        );
        image.elements.push(CoreElement::with_uid(
            "kw0",
            CoreElementKind::FitsKeyword {
                name: "OBJECT".into(),
                value: "'M42'".into(),
                comment: String::new(),
            },
        ));
        header.images.push(image);

        assert!(header.element_by_uid("res0").is_some());
        assert!(header.element_by_uid("kw0").is_some());
        assert!(header.element_by_uid("nope").is_none());
    }
}
