//! Figures emitted by analysis functions
//!
//! Plot rendering happens outside the core: an analysis function renders its
//! plot to bytes (raster and/or vector) and hands a [`Figure`] to its
//! [`AnalysisContext`](crate::analysis::AnalysisContext). The batch runner
//! writes figures marked done through the
//! [`ResultSink`](crate::sink::ResultSink).

use std::fmt;

/// Output file format of a rendered figure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FigureFormat {
    Png,
    Svg,
    Pdf,
}

impl FigureFormat {
    pub fn extension(self) -> &'static str {
        match self {
            FigureFormat::Png => "png",
            FigureFormat::Svg => "svg",
            FigureFormat::Pdf => "pdf",
        }
    }

    pub fn is_vector(self) -> bool {
        matches!(self, FigureFormat::Svg | FigureFormat::Pdf)
    }
}

/// A rendered figure waiting to be written
pub struct Figure {
    filename: String,
    renders: Vec<(FigureFormat, Vec<u8>)>,
    done: bool,
    closed: bool,
}

impl Figure {
    /// New figure with a filename stem relative to the plots directory
    ///
    /// The stem may contain `/` separated sub-directories. Any extension is
    /// stripped; each render adds its own.
    pub fn new(filename: impl Into<String>) -> Self {
        let filename: String = filename.into();
        let stem = match filename.rsplit_once('.') {
            Some((stem, ext))
                if !stem.is_empty() && matches!(ext, "png" | "svg" | "pdf") =>
            {
                stem.to_string()
            }
            _ => filename,
        };
        Self {
            filename: stem,
            renders: Vec::new(),
            done: false,
            closed: false,
        }
    }

    /// Attach rendered bytes for one format (replaces an earlier render of it)
    pub fn with_render(mut self, format: FigureFormat, bytes: Vec<u8>) -> Self {
        self.add_render(format, bytes);
        self
    }

    pub fn add_render(&mut self, format: FigureFormat, bytes: Vec<u8>) {
        self.renders.retain(|(f, _)| *f != format);
        self.renders.push((format, bytes));
    }

    /// Mark the figure complete so the next flush writes it
    pub fn mark_done(&mut self) {
        self.done = true;
    }

    pub fn done(mut self) -> Self {
        self.done = true;
        self
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn renders(&self) -> impl Iterator<Item = (FigureFormat, &[u8])> {
        self.renders.iter().map(|(f, b)| (*f, b.as_slice()))
    }

    pub fn formats(&self) -> Vec<FigureFormat> {
        self.renders.iter().map(|(f, _)| *f).collect()
    }

    /// Release rendered buffers; the figure can no longer be written
    pub fn close(&mut self) {
        self.renders.clear();
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl fmt::Debug for Figure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Figure")
            .field("filename", &self.filename)
            .field("formats", &self.formats())
            .field("done", &self.done)
            .field("closed", &self.closed)
            .finish()
    }
}
