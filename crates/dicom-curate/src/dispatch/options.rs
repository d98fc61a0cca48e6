//! Run configuration for [`curate_many`](super::curate_many).

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;

use crate::codec::DicomCodec;
use crate::curate::{Destination, FileDescriptor, FileInfoIndex, FileSource};
use crate::deid::{DateOffset, DeidPolicy, LongitudinalMode};
use crate::error::{CurateError, Result};
use crate::hash::HashMethod;
use crate::scan::ScanSource;
use crate::spec::{CurationSpecification, SpecLayer};
use crate::transport::{DirectoryHandle, HttpHeaders, ObjectStore};

/// A file handed over in memory.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub name: String,
    pub bytes: Arc<Vec<u8>>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes: Arc::new(bytes),
        }
    }
}

/// Where the files of a run come from.
#[derive(Debug, Clone)]
pub enum InputSource {
    /// A local directory tree, scanned.
    Directory(PathBuf),
    /// A live directory handle, scanned.
    Handle(Arc<dyn DirectoryHandle>),
    /// Every object below a prefix, listed page by page.
    ObjectStore { store: Arc<dyn ObjectStore>, prefix: String },
    /// Files already in memory; not scanned.
    Files(Vec<InputFile>),
    /// Files fetched with HTTP GET; not scanned.
    Urls { urls: Vec<String>, headers: HttpHeaders },
}

impl Default for InputSource {
    fn default() -> Self {
        InputSource::Files(Vec::new())
    }
}

/// Work the input produces: a scan to run, or a fixed file list.
pub(crate) enum InputPlan {
    Scan(ScanSource),
    List(Vec<FileDescriptor>),
}

impl InputSource {
    pub(crate) fn plan(&self) -> InputPlan {
        match self {
            InputSource::Directory(path) => InputPlan::Scan(ScanSource::Directory(path.clone())),
            InputSource::Handle(handle) => InputPlan::Scan(ScanSource::Handle(handle.clone())),
            InputSource::ObjectStore { store, prefix } => InputPlan::Scan(ScanSource::ObjectStore {
                store: store.clone(),
                prefix: prefix.clone(),
            }),
            InputSource::Files(files) => InputPlan::List(
                files
                    .iter()
                    .map(|f| {
                        FileDescriptor::new(f.name.clone(), "", FileSource::Blob(f.bytes.clone()))
                            .with_size(f.bytes.len() as u64)
                    })
                    .collect(),
            ),
            InputSource::Urls { urls, .. } => InputPlan::List(
                urls.iter()
                    .map(|url| {
                        FileDescriptor::new(
                            url.clone(),
                            "",
                            FileSource::Http {
                                url: url.clone(),
                                headers: Default::default(),
                            },
                        )
                    })
                    .collect(),
            ),
        }
    }

    /// Headers fetched at dispatch time, for URL inputs.
    pub(crate) fn dynamic_headers(&self) -> Option<&HttpHeaders> {
        match self {
            InputSource::Urls { headers, .. } => Some(headers),
            _ => None,
        }
    }
}

/// Where curated files go.
#[derive(Debug, Clone, Default)]
pub enum OutputTarget {
    /// Keep bytes in the results.
    #[default]
    None,
    Directory(PathBuf),
    Handle(Arc<dyn DirectoryHandle>),
    Http { url: String, headers: HttpHeaders },
    ObjectStore { store: Arc<dyn ObjectStore>, prefix: String },
}

impl OutputTarget {
    /// The destination for one job, with headers resolved now.
    pub(crate) async fn destination(&self) -> Result<Destination> {
        Ok(match self {
            OutputTarget::None => Destination::None,
            OutputTarget::Directory(path) => Destination::Directory(path.clone()),
            OutputTarget::Handle(handle) => Destination::Handle(handle.clone()),
            OutputTarget::Http { url, headers } => Destination::Http {
                url: url.clone(),
                headers: headers.resolve().await?,
            },
            OutputTarget::ObjectStore { store, prefix } => Destination::ObjectStore {
                store: store.clone(),
                prefix: prefix.clone(),
            },
        })
    }

    pub(crate) fn has_dynamic_headers(&self) -> bool {
        matches!(
            self,
            OutputTarget::Http {
                headers: HttpHeaders::Provider(_),
                ..
            }
        )
    }
}

/// Everything a curation run needs.
#[derive(Clone)]
pub struct OrganizeOptions {
    pub input: InputSource,
    pub output: OutputTarget,
    /// Specification layers, composed in order.
    pub spec_layers: Vec<SpecLayer>,
    /// CSV text for auxiliary lookups.
    pub table: Option<String>,
    pub hash_method: HashMethod,
    /// Map without encoding or writing.
    pub skip_write: bool,
    pub skip_modifications: bool,
    pub skip_validation: bool,
    /// Do not keep per-file results; only progress is reported.
    pub skip_collecting_mappings: bool,
    /// ISO-8601 duration for longitudinal date shifting.
    pub date_offset: Option<String>,
    pub file_info_index: Option<FileInfoIndex>,
    pub worker_count: usize,
    pub policy: Option<Arc<dyn DeidPolicy>>,
    pub codec: Option<Arc<dyn DicomCodec>>,
    /// Flips to `true` to stop scanning; dispatched files still finish.
    pub stop: Option<watch::Receiver<bool>>,
}

impl Default for OrganizeOptions {
    fn default() -> Self {
        Self {
            input: InputSource::default(),
            output: OutputTarget::default(),
            spec_layers: Vec::new(),
            table: None,
            hash_method: HashMethod::default(),
            skip_write: false,
            skip_modifications: false,
            skip_validation: false,
            skip_collecting_mappings: false,
            date_offset: None,
            file_info_index: None,
            worker_count: default_worker_count(),
            policy: None,
            codec: None,
            stop: None,
        }
    }
}

/// One worker per available core.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl OrganizeOptions {
    pub fn new(input: InputSource) -> Self {
        Self {
            input,
            ..Self::default()
        }
    }

    pub fn with_output(mut self, output: OutputTarget) -> Self {
        self.output = output;
        self
    }

    pub fn with_spec_layer(mut self, layer: impl Into<SpecLayer>) -> Self {
        self.spec_layers.push(layer.into());
        self
    }

    pub fn with_spec_layers(mut self, layers: Vec<SpecLayer>) -> Self {
        self.spec_layers = layers;
        self
    }

    pub fn with_table(mut self, csv_text: impl Into<String>) -> Self {
        self.table = Some(csv_text.into());
        self
    }

    pub fn with_hash_method(mut self, method: HashMethod) -> Self {
        self.hash_method = method;
        self
    }

    pub fn with_skip_write(mut self, skip: bool) -> Self {
        self.skip_write = skip;
        self
    }

    pub fn with_skip_modifications(mut self, skip: bool) -> Self {
        self.skip_modifications = skip;
        self
    }

    pub fn with_skip_validation(mut self, skip: bool) -> Self {
        self.skip_validation = skip;
        self
    }

    pub fn with_skip_collecting_mappings(mut self, skip: bool) -> Self {
        self.skip_collecting_mappings = skip;
        self
    }

    pub fn with_date_offset(mut self, offset: impl Into<String>) -> Self {
        self.date_offset = Some(offset.into());
        self
    }

    pub fn with_file_info_index(mut self, index: FileInfoIndex) -> Self {
        self.file_info_index = Some(index);
        self
    }

    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn DeidPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn DicomCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn with_stop(mut self, stop: watch::Receiver<bool>) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Check the parts of the configuration that depend on the composed
    /// specification, returning the parsed date offset.
    pub fn validate(&self, spec: &CurationSpecification) -> Result<Option<DateOffset>> {
        if self.worker_count == 0 {
            return Err(CurateError::Config("worker_count must be at least 1".to_string()));
        }
        let needs_offset = spec
            .deid
            .profile()
            .is_some_and(|p| p.retain_longitudinal_temporal_information_options == LongitudinalMode::Offset);
        match (&self.date_offset, needs_offset) {
            (Some(offset), _) => DateOffset::parse(offset).map(Some).map_err(|_| {
                CurateError::Config(format!("'{}' is not an ISO-8601 duration", offset))
            }),
            (None, true) => Err(CurateError::Config(
                "When using \"Offset\" for retainLongitudinalTemporalInformationOptions, \
                 an ISO-8601 compatible dateOffset must be provided."
                    .to_string(),
            )),
            (None, false) => Ok(None),
        }
    }
}

impl fmt::Debug for OrganizeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrganizeOptions")
            .field("input", &self.input)
            .field("output", &self.output)
            .field("spec_layers", &self.spec_layers.len())
            .field("hash_method", &self.hash_method)
            .field("skip_write", &self.skip_write)
            .field("skip_modifications", &self.skip_modifications)
            .field("skip_validation", &self.skip_validation)
            .field("skip_collecting_mappings", &self.skip_collecting_mappings)
            .field("date_offset", &self.date_offset)
            .field("worker_count", &self.worker_count)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deid::{DeidLayer, PartialPs315Options};
    use crate::spec::{compose_specs, PartialSpec};

    fn offset_spec() -> CurationSpecification {
        let layer = PartialPs315Options::new().with_longitudinal(LongitudinalMode::Offset);
        compose_specs(&[PartialSpec::new().with_deid(DeidLayer::Options(layer)).into()]).unwrap()
    }

    #[test]
    fn test_offset_mode_requires_duration() {
        let spec = offset_spec();
        let err = OrganizeOptions::default().validate(&spec).unwrap_err();
        assert!(matches!(err, CurateError::Config(_)));

        let bad = OrganizeOptions::default().with_date_offset("ten days");
        assert!(bad.validate(&spec).is_err());

        let good = OrganizeOptions::default().with_date_offset("P10D");
        assert!(good.validate(&spec).unwrap().is_some());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let spec = compose_specs(&[PartialSpec::new().into()]).unwrap();
        let options = OrganizeOptions::default().with_worker_count(0);
        assert!(options.validate(&spec).is_err());
    }

    #[test]
    fn test_file_list_plan() {
        let input = InputSource::Files(vec![InputFile::new("a.dcm", vec![1, 2, 3])]);
        let InputPlan::List(files) = input.plan() else {
            panic!("expected a list");
        };
        assert_eq!(files[0].file_path(), "a.dcm");
        assert_eq!(files[0].size, Some(3));
    }
}
