//! Ordered collection of recordings
//!
//! A [`Container`] is built from an index table plus a loader (or one loader
//! per row). Positions are stable for the container's lifetime and every
//! result table follows the same order.
//!
//! # Access policies
//!
//! - Default: [`Container::get`] hands out the stored recording; callers
//!   load it themselves (or call [`Container::load`] for everything).
//! - On-the-fly: `get(i)` keeps a single materialized copy of recording `i`
//!   and releases the previous one first, so at most one payload is alive.
//!
//! Recordings that fail to construct or load with a recoverable error are
//! kept in place and listed in [`Container::invalid_sources`].

use crate::loader::{create_from_descriptor, Loader, LoaderDescriptor};
use crate::recording::{Recording, RecordingSnapshot, ResultValue, INDEX_KEY};
use crate::table::{render_value, IndexTable, ResultTable};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use simuran_common::{Error, ErrorKind, ParameterMap, Result};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Loader assignment for a container
#[derive(Debug, Clone)]
pub enum LoaderSet {
    /// One loader shared by every recording
    Single(Arc<dyn Loader>),
    /// One loader per recording, aligned with the items
    PerItem(Vec<Arc<dyn Loader>>),
}

impl LoaderSet {
    pub fn for_index(&self, i: usize) -> Option<&Arc<dyn Loader>> {
        match self {
            LoaderSet::Single(loader) => Some(loader),
            LoaderSet::PerItem(loaders) => loaders.get(i),
        }
    }

    fn subset(&self, indices: &[usize]) -> Self {
        match self {
            LoaderSet::Single(loader) => LoaderSet::Single(loader.clone()),
            LoaderSet::PerItem(loaders) => LoaderSet::PerItem(
                indices.iter().filter_map(|&i| loaders.get(i).cloned()).collect(),
            ),
        }
    }

    fn to_snapshot(&self) -> LoaderSetSnapshot {
        match self {
            LoaderSet::Single(loader) => LoaderSetSnapshot::Single(loader.descriptor()),
            LoaderSet::PerItem(loaders) => {
                LoaderSetSnapshot::PerItem(loaders.iter().map(|l| l.descriptor()).collect())
            }
        }
    }
}

impl From<Arc<dyn Loader>> for LoaderSet {
    fn from(loader: Arc<dyn Loader>) -> Self {
        LoaderSet::Single(loader)
    }
}

/// A recording that could not be constructed or loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidSource {
    /// Position in the container
    pub index: usize,
    /// Source handle, or a row label when no handle was resolved
    pub handle: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Result of [`Container::find_recording_with_source`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceMatch {
    None,
    Single(usize),
    Multiple(Vec<usize>),
}

/// Ordered collection of recordings
#[derive(Debug, Default)]
pub struct Container {
    items: Vec<Recording>,
    loaders: Option<LoaderSet>,
    table: Option<IndexTable>,
    /// Container-wide metadata
    pub attrs: ParameterMap,
    last_loaded_index: Option<usize>,
    last_loaded: Option<Recording>,
    load_on_fly: bool,
    invalid_sources: Vec<InvalidSource>,
}

impl Container {
    /// Empty container whose recordings use `loader`
    pub fn new(loader: Arc<dyn Loader>) -> Self {
        Self {
            loaders: Some(LoaderSet::Single(loader)),
            ..Self::default()
        }
    }

    /// Build one recording per table row, in row order
    ///
    /// Configuration errors abort construction. Recoverable errors keep the
    /// recording in place and record it as an invalid source.
    pub fn from_table(table: IndexTable, loaders: impl Into<LoaderSet>) -> Result<Self> {
        let loaders = loaders.into();
        if let LoaderSet::PerItem(list) = &loaders {
            if list.len() != table.len() {
                return Err(Error::Configuration(format!(
                    "{} loaders given for an index table of {} rows",
                    list.len(),
                    table.len()
                )));
            }
        }

        let mut container = Self {
            loaders: Some(loaders.clone()),
            ..Self::default()
        };
        for (i, row) in table.rows().iter().enumerate() {
            let loader = loaders
                .for_index(i)
                .cloned()
                .ok_or_else(|| Error::Configuration(format!("no loader for row {}", i)))?;
            let mut recording = Recording::new().with_loader(loader.clone());
            if let Err(err) = loader.parse_row(row, &mut recording) {
                if !err.is_recoverable() {
                    return Err(err);
                }
                warn!("Could not construct recording for row {}: {}", row.index, err);
                container.items.push(recording);
                container.mark_invalid(i, &err);
                continue;
            }
            container.items.push(recording);
        }
        container.table = Some(table);
        info!(
            "Built container of {} recordings ({} invalid)",
            container.len(),
            container.invalid_sources.len()
        );
        Ok(container)
    }

    /// Append a recording; it keeps its own loader or takes the shared one
    pub fn push(&mut self, mut recording: Recording) -> Result<()> {
        if self.loaders.is_none() {
            self.loaders = recording.loader().cloned().map(LoaderSet::Single);
        }
        match &mut self.loaders {
            Some(LoaderSet::Single(loader)) => {
                if recording.loader().is_none() {
                    recording.set_loader(loader.clone());
                }
            }
            Some(LoaderSet::PerItem(list)) => {
                let loader = recording.loader().cloned().ok_or_else(|| {
                    Error::Configuration(
                        "recordings pushed into a per-item loader container need a loader".into(),
                    )
                })?;
                list.push(loader);
            }
            None => {}
        }
        self.items.push(recording);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Recording> {
        self.items.iter()
    }

    pub fn recordings(&self) -> &[Recording] {
        &self.items
    }

    pub fn recording(&self, i: usize) -> Option<&Recording> {
        self.items.get(i)
    }

    pub fn recording_mut(&mut self, i: usize) -> Option<&mut Recording> {
        self.items.get_mut(i)
    }

    pub fn table(&self) -> Option<&IndexTable> {
        self.table.as_ref()
    }

    pub fn loaders(&self) -> Option<&LoaderSet> {
        self.loaders.as_ref()
    }

    pub fn loader_for(&self, i: usize) -> Option<Arc<dyn Loader>> {
        self.loaders
            .as_ref()
            .and_then(|set| set.for_index(i).cloned())
            .or_else(|| self.items.get(i).and_then(|r| r.loader().cloned()))
    }

    pub fn load_on_fly(&self) -> bool {
        self.load_on_fly
    }

    /// Switch the access policy; leaving on-the-fly mode releases the cache
    pub fn set_load_on_fly(&mut self, enabled: bool) {
        if !enabled {
            self.clear_cache();
        }
        self.load_on_fly = enabled;
    }

    pub fn last_loaded_index(&self) -> Option<usize> {
        self.last_loaded_index
    }

    pub fn last_loaded(&self) -> Option<&Recording> {
        self.last_loaded.as_ref()
    }

    /// Unload and drop the on-the-fly copy
    pub fn clear_cache(&mut self) {
        if let Some(mut cached) = self.last_loaded.take() {
            cached.unload();
        }
        self.last_loaded_index = None;
    }

    fn check_index(&self, i: usize) -> Result<()> {
        if i >= self.items.len() {
            return Err(Error::InvalidInput(format!(
                "recording index {} out of range for container of {}",
                i,
                self.items.len()
            )));
        }
        Ok(())
    }

    /// Access recording `i` under the current policy
    ///
    /// In on-the-fly mode the returned recording is a loaded copy held in
    /// the single-slot cache; results must be committed back with
    /// [`Container::commit_results`]. On a load failure the cache is left
    /// empty.
    pub fn get(&mut self, i: usize) -> Result<&mut Recording> {
        self.check_index(i)?;
        if !self.load_on_fly {
            return Ok(&mut self.items[i]);
        }

        if self.last_loaded_index != Some(i) || self.last_loaded.is_none() {
            self.clear_cache();
            let mut copy = self.items[i].metadata_copy();
            copy.load()?;
            debug!("On-the-fly cache now holds recording {}", i);
            self.last_loaded = Some(copy);
            self.last_loaded_index = Some(i);
        }
        self.last_loaded
            .as_mut()
            .ok_or_else(|| Error::InvalidInput(format!("recording {} is not cached", i)))
    }

    /// Load every recording; disables the on-the-fly cache
    ///
    /// A recoverable failure marks that recording invalid and loading goes
    /// on with the next one. Anything else stops and is returned.
    pub fn load(&mut self) -> Result<()> {
        self.set_load_on_fly(false);
        for i in 0..self.items.len() {
            if self.is_invalid(i) {
                continue;
            }
            if let Err(err) = self.items[i].load() {
                if !err.is_recoverable() {
                    return Err(err);
                }
                warn!("Could not load recording {} ({}): {}", i, self.row_label(i), err);
                self.mark_invalid(i, &err);
            }
        }
        Ok(())
    }

    /// Release every payload, including the on-the-fly copy
    pub fn unload(&mut self) {
        self.clear_cache();
        for recording in &mut self.items {
            recording.unload();
        }
    }

    /// Walk the recordings, loading each on entry and unloading it when
    /// the walk advances or the iterator is dropped
    pub fn load_iter(&mut self) -> LoadIter<'_> {
        self.clear_cache();
        LoadIter {
            container: self,
            next: 0,
            current: None,
        }
    }

    /// New container with the recordings at `indices`, in container order
    pub fn subsample(&self, indices: &[usize]) -> Result<Container> {
        let indices = self.normalize_indices(indices)?;
        let mut subset = Container {
            items: indices.iter().map(|&i| self.items[i].metadata_copy()).collect(),
            loaders: self.loaders.as_ref().map(|l| l.subset(&indices)),
            table: self.subset_table(&indices),
            attrs: self.attrs.clone(),
            last_loaded_index: None,
            last_loaded: None,
            load_on_fly: self.load_on_fly,
            invalid_sources: Vec::new(),
        };
        subset.invalid_sources = self.remap_invalid(&indices);
        Ok(subset)
    }

    /// Keep only the recordings at `indices`, in container order
    pub fn subsample_in_place(&mut self, indices: &[usize]) -> Result<()> {
        let indices = self.normalize_indices(indices)?;
        self.clear_cache();
        self.invalid_sources = self.remap_invalid(&indices);
        self.table = self.subset_table(&indices);
        self.loaders = self.loaders.as_ref().map(|l| l.subset(&indices));

        let mut keep = indices.iter().peekable();
        let mut position = 0;
        self.items.retain(|_| {
            let kept = keep.peek() == Some(&&position);
            if kept {
                keep.next();
            }
            position += 1;
            kept
        });
        Ok(())
    }

    /// New container with the recordings matching `predicate`
    pub fn filter<F>(&self, predicate: F) -> Container
    where
        F: Fn(&Recording) -> bool,
    {
        let indices = self.matching_indices(predicate);
        // Indices come from this container so they are always in range
        self.subsample(&indices).unwrap_or_default()
    }

    /// Keep only the recordings matching `predicate`
    pub fn retain<F>(&mut self, predicate: F)
    where
        F: Fn(&Recording) -> bool,
    {
        let indices = self.matching_indices(predicate);
        if let Err(err) = self.subsample_in_place(&indices) {
            warn!("retain failed: {}", err);
        }
    }

    fn matching_indices<F>(&self, predicate: F) -> Vec<usize>
    where
        F: Fn(&Recording) -> bool,
    {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, r)| predicate(r))
            .map(|(i, _)| i)
            .collect()
    }

    fn normalize_indices(&self, indices: &[usize]) -> Result<Vec<usize>> {
        let mut sorted = indices.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        if let Some(&last) = sorted.last() {
            self.check_index(last)?;
        }
        Ok(sorted)
    }

    fn subset_table(&self, indices: &[usize]) -> Option<IndexTable> {
        self.table
            .as_ref()
            .filter(|t| t.len() == self.items.len())
            .map(|t| t.subset(indices))
    }

    fn remap_invalid(&self, indices: &[usize]) -> Vec<InvalidSource> {
        self.invalid_sources
            .iter()
            .filter_map(|invalid| {
                indices
                    .binary_search(&invalid.index)
                    .ok()
                    .map(|position| InvalidSource {
                        index: position,
                        ..invalid.clone()
                    })
            })
            .collect()
    }

    /// Recordings whose `key` property renders equal to `value`
    pub fn group_by_property(&self, key: &str, value: &Value) -> Result<(Container, Vec<usize>)> {
        let wanted = render_value(value, None);
        let indices = self.matching_indices(|r| {
            r.property(key)
                .map(|v| render_value(&v, None) == wanted)
                .unwrap_or(false)
        });
        Ok((self.subsample(&indices)?, indices))
    }

    /// Split by the rendered value of `key`, groups in first-seen order
    ///
    /// Recordings without the property are left out.
    pub fn split_into_groups(&self, key: &str) -> Result<IndexMap<String, (Container, Vec<usize>)>> {
        let mut groups: IndexMap<String, Vec<usize>> = IndexMap::new();
        for (i, recording) in self.items.iter().enumerate() {
            if let Some(value) = recording.property(key) {
                groups.entry(render_value(&value, None)).or_default().push(i);
            }
        }
        groups
            .into_iter()
            .map(|(group, indices)| -> Result<(String, (Container, Vec<usize>))> {
                Ok((group, (self.subsample(&indices)?, indices)))
            })
            .collect()
    }

    /// Index of the recording whose source matches `handle` after normalization
    pub fn find_recording_with_source(&self, handle: &str) -> SourceMatch {
        let wanted = normalize_handle(handle);
        let matches: Vec<usize> = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, r)| {
                r.source_file
                    .as_deref()
                    .map(|s| normalize_handle(s) == wanted)
                    .unwrap_or(false)
            })
            .map(|(i, _)| i)
            .collect();
        match matches.len() {
            0 => SourceMatch::None,
            1 => SourceMatch::Single(matches[0]),
            _ => SourceMatch::Multiple(matches),
        }
    }

    /// Row identity of recording `i` as written in result tables
    pub fn row_label(&self, i: usize) -> String {
        self.items
            .get(i)
            .and_then(|r| r.attrs.get(INDEX_KEY))
            .map(|v| render_value(v, None))
            .unwrap_or_else(|| i.to_string())
    }

    pub fn invalid_sources(&self) -> &[InvalidSource] {
        &self.invalid_sources
    }

    /// Record that recording `i` failed with `err` (replaces an earlier entry)
    pub fn mark_invalid(&mut self, i: usize, err: &Error) {
        let handle = self
            .items
            .get(i)
            .map(|r| r.display_name())
            .unwrap_or_else(|| format!("row {}", i));
        self.invalid_sources.retain(|invalid| invalid.index != i);
        self.invalid_sources.push(InvalidSource {
            index: i,
            handle,
            kind: err.kind(),
            message: err.to_string(),
        });
        self.invalid_sources.sort_by_key(|invalid| invalid.index);
    }

    pub fn is_invalid(&self, i: usize) -> bool {
        self.invalid_sources.iter().any(|invalid| invalid.index == i)
    }

    /// Append results to recording `i` (and to its on-the-fly copy)
    pub fn commit_results<I>(&mut self, i: usize, results: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, ResultValue)>,
    {
        self.check_index(i)?;
        let results: Vec<(String, ResultValue)> = results.into_iter().collect();
        if self.last_loaded_index == Some(i) {
            if let Some(cached) = self.last_loaded.as_mut() {
                cached.merge_results(results.iter().cloned());
            }
        }
        self.items[i].merge_results(results);
        Ok(())
    }

    /// Every recording's results, in container order
    pub fn get_results(&self) -> Vec<&IndexMap<String, ResultValue>> {
        self.items.iter().map(|r| &r.results).collect()
    }

    /// Flatten results into one row per recording
    ///
    /// Columns are the union of result keys in first-seen order; missing
    /// entries stay empty. Rows are labelled with `_index` (or position).
    pub fn save_results_to_table(&self) -> ResultTable {
        let mut columns: Vec<String> = Vec::new();
        for recording in &self.items {
            for key in recording.results.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        let row_index = self
            .items
            .iter()
            .enumerate()
            .map(|(i, r)| r.index().cloned().unwrap_or_else(|| Value::from(i)))
            .collect();
        let rows = self
            .items
            .iter()
            .map(|r| {
                columns
                    .iter()
                    .map(|c| r.results.get(c).map(ResultValue::to_cell))
                    .collect()
            })
            .collect();
        ResultTable {
            columns,
            row_index,
            rows,
        }
    }

    /// Write the container to `path`
    ///
    /// `results_only` writes the flattened result table (CSV/TSV by
    /// extension); otherwise a JSON snapshot that [`Container::restore`]
    /// reads back.
    pub fn dump(&self, path: impl AsRef<Path>, results_only: bool) -> Result<()> {
        let path = path.as_ref();
        if results_only {
            return self.save_results_to_table().write_csv(path, None);
        }
        let snapshot = ContainerSnapshot {
            attrs: self.attrs.clone(),
            load_on_fly: self.load_on_fly,
            loaders: self.loaders.as_ref().map(LoaderSet::to_snapshot),
            recordings: self.items.iter().map(Recording::to_snapshot).collect(),
            invalid_sources: self.invalid_sources.clone(),
            table: self.table.clone(),
        };
        let text = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| Error::format(path.display().to_string(), e))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, text)?;
        debug!("Dumped {} recordings to {}", self.len(), path.display());
        Ok(())
    }

    /// Rebuild a container from a [`Container::dump`] snapshot
    ///
    /// Loaders are recreated through the registry; payloads are not restored.
    pub fn restore(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::SourceUnavailable(path.display().to_string()),
            _ => Error::Io(e),
        })?;
        let snapshot: ContainerSnapshot = serde_json::from_str(&text)
            .map_err(|e| Error::format(path.display().to_string(), e))?;

        let loaders = match snapshot.loaders {
            Some(LoaderSetSnapshot::Single(descriptor)) => {
                Some(LoaderSet::Single(create_from_descriptor(&descriptor)?))
            }
            Some(LoaderSetSnapshot::PerItem(descriptors)) => Some(LoaderSet::PerItem(
                descriptors
                    .iter()
                    .map(create_from_descriptor)
                    .collect::<Result<Vec<_>>>()?,
            )),
            None => None,
        };
        let items = snapshot
            .recordings
            .into_iter()
            .enumerate()
            .map(|(i, recording)| {
                let loader = loaders.as_ref().and_then(|set| set.for_index(i).cloned());
                Recording::from_snapshot(recording, loader)
            })
            .collect();

        Ok(Self {
            items,
            loaders,
            table: snapshot.table,
            attrs: snapshot.attrs,
            last_loaded_index: None,
            last_loaded: None,
            load_on_fly: snapshot.load_on_fly,
            invalid_sources: snapshot.invalid_sources,
        })
    }
}

impl std::ops::Index<usize> for Container {
    type Output = Recording;

    fn index(&self, i: usize) -> &Recording {
        &self.items[i]
    }
}

impl<'a> IntoIterator for &'a Container {
    type Item = &'a Recording;
    type IntoIter = std::slice::Iter<'a, Recording>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Sequential loading walk over a container
///
/// Not an [`Iterator`]: each yielded recording borrows the walk, which is
/// what lets the walk release it on the next step.
pub struct LoadIter<'a> {
    container: &'a mut Container,
    next: usize,
    current: Option<usize>,
}

impl<'a> LoadIter<'a> {
    /// Unload the previous recording, then load and return the next one
    ///
    /// A recording that fails to load is returned as `Some(Err(..))` and the
    /// walk moves past it.
    pub fn next_loaded(&mut self) -> Option<Result<&mut Recording>> {
        self.release_current();
        let i = self.next;
        if i >= self.container.items.len() {
            return None;
        }
        self.next += 1;
        let recording = &mut self.container.items[i];
        match recording.load() {
            Ok(()) => {
                self.current = Some(i);
                Some(Ok(recording))
            }
            Err(err) => Some(Err(err)),
        }
    }

    /// Position of the recording most recently yielded
    pub fn position(&self) -> Option<usize> {
        self.current
    }

    fn release_current(&mut self) {
        if let Some(i) = self.current.take() {
            if let Some(recording) = self.container.items.get_mut(i) {
                recording.unload();
            }
        }
    }
}

impl Drop for LoadIter<'_> {
    fn drop(&mut self) {
        self.release_current();
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum LoaderSetSnapshot {
    Single(LoaderDescriptor),
    PerItem(Vec<LoaderDescriptor>),
}

#[derive(Debug, Serialize, Deserialize)]
struct ContainerSnapshot {
    attrs: ParameterMap,
    load_on_fly: bool,
    loaders: Option<LoaderSetSnapshot>,
    recordings: Vec<RecordingSnapshot>,
    #[serde(default)]
    invalid_sources: Vec<InvalidSource>,
    #[serde(default)]
    table: Option<IndexTable>,
}

/// Normalize a source handle for comparison
///
/// URLs lose trailing slashes; paths are normalized lexically (`.` dropped,
/// `..` folded, `\` treated as a separator).
fn normalize_handle(handle: &str) -> String {
    let handle = handle.trim();
    if handle.contains("://") {
        return handle.trim_end_matches('/').to_string();
    }
    let unified = handle.replace('\\', "/");
    let mut normalized = PathBuf::new();
    for component in Path::new(&unified).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized.to_string_lossy().into_owned()
}
