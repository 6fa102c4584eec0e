//! Visualization output: named lists of vectors anchored at points.
//!
//! The computation hands every view it produces to a [`ViewSink`].
//! [`ViewCollection`] keeps them in memory,
//! [`PosWriter`] writes them as gmsh post-processing views,
//! and [`DiscardViews`] drops them.

use std::io::Write;

use crate::Vec3;

/// A vector drawn at a point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VectorGlyph {
    /// Where the vector is anchored.
    pub point: Vec3,
    /// The vector itself.
    pub vector: Vec3,
}

/// Error in emitting a view.
#[derive(thiserror::Error, Debug)]
pub enum ViewError {
    /// Writing the view failed.
    #[error("failed to write view")]
    Io(#[from] std::io::Error),
}

/// Receiver of named vector views.
pub trait ViewSink {
    /// Accept one view.
    fn add_view(&mut self, name: &str, glyphs: Vec<VectorGlyph>) -> Result<(), ViewError>;
}

impl<T: ViewSink + ?Sized> ViewSink for &mut T {
    fn add_view(&mut self, name: &str, glyphs: Vec<VectorGlyph>) -> Result<(), ViewError> {
        (**self).add_view(name, glyphs)
    }
}

/// A sink that ignores every view.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscardViews;

impl ViewSink for DiscardViews {
    fn add_view(&mut self, _name: &str, _glyphs: Vec<VectorGlyph>) -> Result<(), ViewError> {
        Ok(())
    }
}

/// A sink keeping all views in memory in the order they were added.
#[derive(Clone, Debug, Default)]
pub struct ViewCollection {
    views: Vec<(String, Vec<VectorGlyph>)>,
}

impl ViewCollection {
    /// Get the most recently added view with the given name.
    pub fn get(&self, name: &str) -> Option<&[VectorGlyph]> {
        self.views
            .iter()
            .rev()
            .find(|(view_name, _)| view_name == name)
            .map(|(_, glyphs)| glyphs.as_slice())
    }

    /// Names of all views in the order they were added.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.views.iter().map(|(name, _)| name.as_str())
    }

    /// Number of views collected.
    #[inline]
    pub fn len(&self) -> usize {
        self.views.len()
    }

    /// Whether no views have been collected.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

impl ViewSink for ViewCollection {
    fn add_view(&mut self, name: &str, glyphs: Vec<VectorGlyph>) -> Result<(), ViewError> {
        self.views.push((name.to_string(), glyphs));
        Ok(())
    }
}

/// A sink writing views in gmsh's list-based post-processing format,
/// loadable in gmsh as a `.pos` file.
///
/// Each view becomes a block of vector points:
///
/// ```text
/// View "crosses" {
/// VP(0.5,0,0){0.5,0,0};
/// };
/// ```
#[derive(Debug)]
pub struct PosWriter<W: Write> {
    writer: W,
}

impl<W: Write> PosWriter<W> {
    /// Write views into the given writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Get the writer back.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ViewSink for PosWriter<W> {
    fn add_view(&mut self, name: &str, glyphs: Vec<VectorGlyph>) -> Result<(), ViewError> {
        // gmsh strings can't contain unescaped quotes
        writeln!(self.writer, "View \"{}\" {{", name.replace('"', "\\\""))?;
        for VectorGlyph { point: p, vector: v } in glyphs {
            writeln!(
                self.writer,
                "VP({},{},{}){{{},{},{}}};",
                p.x, p.y, p.z, v.x, v.y, v.z
            )?;
        }
        writeln!(self.writer, "}};")?;
        self.writer.flush()?;
        Ok(())
    }
}
