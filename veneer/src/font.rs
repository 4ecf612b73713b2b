//! Font configuration and the host-owned font registry.
//!
//! Rasterization and shaping belong to the pixel backend; the registry only
//! tracks loaded faces, their options, and the synthetic metrics the render
//! cache needs for measurement. Caches refer to fonts through [`FontId`]
//! handles, and every handle recorded into a frame is pinned until the host
//! clears its font references, so replay never observes a dangling font.

use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ahash::RandomState;
use bitflags::bitflags;
use log::error;
use serde::{Deserialize, Serialize};
use unicode_width::UnicodeWidthChar;

use veneer_render::font::{FontGroup, FontId, FontLibrary, FONT_FALLBACK_MAX};

/// Tab width of a freshly loaded face, in characters.
const DEFAULT_TAB_SIZE: i8 = 4;

/// Font configuration errors.
#[derive(Debug)]
pub enum Error {
    /// Unrecognized antialiasing option string.
    UnknownAntialiasing(String),

    /// Unrecognized hinting option string.
    UnknownHinting(String),

    /// A font group needs at least one member.
    EmptyGroup,

    /// A font group is limited to [`FONT_FALLBACK_MAX`] members.
    OversizedGroup(usize),

    /// The font file does not exist or is unreadable.
    MissingFont(PathBuf),

    /// The handle does not refer to a loaded font.
    StaleFont(FontId),
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnknownAntialiasing(option) => {
                write!(f, "unknown antialiasing option: {option:?}")
            },
            Error::UnknownHinting(option) => write!(f, "unknown hinting option: {option:?}"),
            Error::EmptyGroup => write!(f, "failed to create font group: group is empty"),
            Error::OversizedGroup(len) => {
                write!(f, "failed to create font group: {len} members exceed the limit of {FONT_FALLBACK_MAX}")
            },
            Error::MissingFont(path) => write!(f, "failed to load font: {}", path.display()),
            Error::StaleFont(id) => write!(f, "font handle {} is stale", id.raw()),
        }
    }
}

/// Glyph edge treatment requested from the rasterizer.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Antialiasing {
    None,
    Grayscale,
    #[default]
    Subpixel,
}

impl FromStr for Antialiasing {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Antialiasing::None),
            "grayscale" => Ok(Antialiasing::Grayscale),
            "subpixel" => Ok(Antialiasing::Subpixel),
            _ => Err(Error::UnknownAntialiasing(s.into())),
        }
    }
}

/// Outline hinting requested from the rasterizer.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Hinting {
    None,
    #[default]
    Slight,
    Full,
}

impl FromStr for Hinting {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Hinting::None),
            "slight" => Ok(Hinting::Slight),
            "full" => Ok(Hinting::Full),
            _ => Err(Error::UnknownHinting(s.into())),
        }
    }
}

bitflags! {
    /// Style bits applied on top of the base face.
    #[derive(Serialize, Deserialize, Debug, Copy, Clone, Default, Eq, PartialEq)]
    pub struct FontStyle: u32 {
        const ITALIC = 1;
        const BOLD = 1 << 1;
        const UNDERLINE = 1 << 2;
        const SMOOTH = 1 << 3;
        const STRIKETHROUGH = 1 << 4;
    }
}

/// Loading options for a face.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Default, Eq, PartialEq)]
#[serde(default)]
pub struct FontOptions {
    pub antialiasing: Antialiasing,
    pub hinting: Hinting,
    pub style: FontStyle,
}

/// A loaded face: identity plus the synthetic monospace metrics used for
/// measurement. One logical advance unit is half the font size.
#[derive(Debug, Clone)]
struct Face {
    path: PathBuf,
    size: f32,
    options: FontOptions,
    tab_size: i8,
}

impl Face {
    fn advance_unit(&self) -> f64 {
        f64::from(self.size) / 2.0
    }

    /// Advance of a single character, honoring tabs and wide glyphs.
    fn char_advance(&self, c: char) -> f64 {
        if c == '\t' {
            f64::from(self.tab_size) * self.advance_unit()
        } else {
            c.width().unwrap_or(0) as f64 * self.advance_unit()
        }
    }

    fn height(&self) -> i32 {
        self.size.round() as i32
    }
}

/// Host-owned table of loaded fonts, addressed by [`FontId`].
#[derive(Debug, Default)]
pub struct FontRegistry {
    faces: Vec<Option<Face>>,
    pinned: HashSet<FontId, RandomState>,
    deferred: Vec<FontId>,
}

impl FontRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a font file at the given size.
    ///
    /// Only the file's presence is verified here; rasterization happens in
    /// the backend when glyphs are first needed.
    pub fn load(&mut self, path: &Path, size: f32, options: FontOptions) -> Result<FontId> {
        if fs::metadata(path).is_err() {
            return Err(Error::MissingFont(path.into()));
        }
        Ok(self.alloc(Face {
            path: path.into(),
            size,
            options,
            tab_size: DEFAULT_TAB_SIZE,
        }))
    }

    /// Duplicate a font, optionally changing size or options.
    ///
    /// The size defaults to the source font's height, matching the behavior
    /// of copying for a derived UI scale.
    pub fn copy(&mut self, id: FontId, size: Option<f32>, options: Option<FontOptions>) -> Result<FontId> {
        let face = self.face(id).ok_or(Error::StaleFont(id))?;
        let face = Face {
            path: face.path.clone(),
            size: size.unwrap_or(face.height() as f32),
            options: options.unwrap_or(face.options),
            tab_size: face.tab_size,
        };
        Ok(self.alloc(face))
    }

    /// Duplicate every member of a group, preserving the fallback order.
    pub fn copy_group(
        &mut self,
        group: &FontGroup,
        size: Option<f32>,
        options: Option<FontOptions>,
    ) -> Result<FontGroup> {
        let mut copies = Vec::with_capacity(group.len());
        for id in group.iter() {
            copies.push(self.copy(id, size, options)?);
        }
        self.group(&copies)
    }

    /// Build a fallback chain out of loaded fonts.
    pub fn group(&self, fonts: &[FontId]) -> Result<FontGroup> {
        if fonts.is_empty() {
            return Err(Error::EmptyGroup);
        }
        if fonts.len() > FONT_FALLBACK_MAX {
            return Err(Error::OversizedGroup(fonts.len()));
        }
        for &id in fonts {
            if self.face(id).is_none() {
                return Err(Error::StaleFont(id));
            }
        }
        Ok(FontGroup::new(fonts))
    }

    pub fn path(&self, id: FontId) -> Result<&Path> {
        self.face(id).map(|face| face.path.as_path()).ok_or(Error::StaleFont(id))
    }

    /// Size of the group's primary font.
    pub fn size(&self, group: &FontGroup) -> f32 {
        group.primary().and_then(|id| self.face(id)).map_or(0.0, |face| face.size)
    }

    /// Resize every font in the group.
    pub fn set_size(&mut self, group: &FontGroup, size: f32) {
        for id in group.iter() {
            if let Some(face) = self.face_mut(id) {
                face.size = size;
            }
        }
    }

    /// Measured advance width of `text` for the group.
    pub fn width(&self, group: &FontGroup, text: &str) -> f64 {
        self.group_width(group, text).0
    }

    pub fn height(&self, group: &FontGroup) -> i32 {
        self.group_height(group)
    }

    /// Drop a font. Fonts referenced by a frame in flight are kept alive
    /// until the next [`clear_refs`].
    ///
    /// [`clear_refs`]: Self::clear_refs
    pub fn remove(&mut self, id: FontId) {
        if self.pinned.contains(&id) {
            self.deferred.push(id);
        } else {
            self.release(id);
        }
    }

    /// Mark a group's fonts as referenced by recorded commands.
    pub fn pin_group(&mut self, group: &FontGroup) {
        for id in group.iter() {
            self.pinned.insert(id);
        }
    }

    /// Release all frame pins and perform the deferred removals.
    pub fn clear_refs(&mut self) {
        self.pinned.clear();
        for id in std::mem::take(&mut self.deferred) {
            self.release(id);
        }
    }

    fn alloc(&mut self, face: Face) -> FontId {
        let slot = self.faces.iter().position(Option::is_none).unwrap_or_else(|| {
            self.faces.push(None);
            self.faces.len() - 1
        });
        self.faces[slot] = Some(face);
        // Slot values start at one; zero marks an empty group entry.
        FontId::from_raw(slot as u32 + 1).expect("non-zero font slot")
    }

    fn release(&mut self, id: FontId) {
        let slot = (id.raw() - 1) as usize;
        if let Some(face) = self.faces.get_mut(slot) {
            *face = None;
        }
    }

    fn face(&self, id: FontId) -> Option<&Face> {
        self.faces.get((id.raw() - 1) as usize).and_then(Option::as_ref)
    }

    fn face_mut(&mut self, id: FontId) -> Option<&mut Face> {
        self.faces.get_mut((id.raw() - 1) as usize).and_then(Option::as_mut)
    }

    /// The group's primary face, logging stale handles instead of
    /// panicking; measurement then degrades to empty metrics.
    fn primary_face(&self, group: &FontGroup) -> Option<&Face> {
        let id = group.primary()?;
        let face = self.face(id);
        if face.is_none() {
            error!("font handle {} used after removal", id.raw());
        }
        face
    }
}

impl FontLibrary for FontRegistry {
    fn group_width(&self, group: &FontGroup, text: &str) -> (f64, i32) {
        let Some(face) = self.primary_face(group) else { return (0.0, 0) };
        let width = text.chars().map(|c| face.char_advance(c)).sum();
        (width, 0)
    }

    fn group_height(&self, group: &FontGroup) -> i32 {
        self.primary_face(group).map_or(0, Face::height)
    }

    fn group_tab_size(&self, group: &FontGroup) -> i8 {
        self.primary_face(group).map_or(DEFAULT_TAB_SIZE, |face| face.tab_size)
    }

    fn set_group_tab_size(&mut self, group: &FontGroup, tab_size: i8) {
        for id in group.iter() {
            if let Some(face) = self.face_mut(id) {
                face.tab_size = tab_size;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::env;

    fn font_file(name: &str) -> PathBuf {
        let path = env::temp_dir().join(name);
        fs::write(&path, b"stub font file").unwrap();
        path
    }

    #[test]
    fn option_strings_parse() {
        assert_eq!("subpixel".parse::<Antialiasing>().unwrap(), Antialiasing::Subpixel);
        assert_eq!("slight".parse::<Hinting>().unwrap(), Hinting::Slight);
        assert!(matches!(
            "fancy".parse::<Antialiasing>(),
            Err(Error::UnknownAntialiasing(option)) if option == "fancy"
        ));
        assert!(matches!("fancy".parse::<Hinting>(), Err(Error::UnknownHinting(_))));
    }

    #[test]
    fn load_requires_an_existing_file() {
        let mut fonts = FontRegistry::new();
        let missing = Path::new("/nonexistent/veneer-test.ttf");
        assert!(matches!(fonts.load(missing, 12.0, FontOptions::default()), Err(Error::MissingFont(_))));
    }

    #[test]
    fn group_size_is_validated() {
        let mut fonts = FontRegistry::new();
        let path = font_file("veneer-group.ttf");
        let id = fonts.load(&path, 12.0, FontOptions::default()).unwrap();

        assert!(matches!(fonts.group(&[]), Err(Error::EmptyGroup)));
        assert!(matches!(
            fonts.group(&vec![id; FONT_FALLBACK_MAX + 1]),
            Err(Error::OversizedGroup(_))
        ));
        assert_eq!(fonts.group(&[id]).unwrap().len(), 1);
    }

    #[test]
    fn width_uses_tabs_and_wide_chars() {
        let mut fonts = FontRegistry::new();
        let path = font_file("veneer-width.ttf");
        let id = fonts.load(&path, 12.0, FontOptions::default()).unwrap();
        let group = fonts.group(&[id]).unwrap();

        // Advance unit is half the size.
        assert_eq!(fonts.width(&group, "ab"), 12.0);
        // Default tab is four advance units.
        assert_eq!(fonts.width(&group, "\t"), 24.0);
        fonts.set_group_tab_size(&group, 2);
        assert_eq!(fonts.width(&group, "\t"), 12.0);
        // A fullwidth character takes two units.
        assert_eq!(fonts.width(&group, "あ"), 12.0);
        assert_eq!(fonts.height(&group), 12);
    }

    #[test]
    fn copy_defaults_to_current_height() {
        let mut fonts = FontRegistry::new();
        let path = font_file("veneer-copy.ttf");
        let id = fonts.load(&path, 12.4, FontOptions::default()).unwrap();

        let copy = fonts.copy(id, None, None).unwrap();
        let group = fonts.group(&[copy]).unwrap();
        assert_eq!(fonts.size(&group), 12.0);
        assert_eq!(fonts.path(copy).unwrap(), path);
    }

    #[test]
    fn pinned_fonts_survive_until_refs_clear() {
        let mut fonts = FontRegistry::new();
        let path = font_file("veneer-pin.ttf");
        let id = fonts.load(&path, 10.0, FontOptions::default()).unwrap();
        let group = fonts.group(&[id]).unwrap();

        fonts.pin_group(&group);
        fonts.remove(id);
        // Still resolvable while the frame may replay it.
        assert!(fonts.path(id).is_ok());
        assert_eq!(fonts.width(&group, "x"), 5.0);

        fonts.clear_refs();
        assert!(matches!(fonts.path(id), Err(Error::StaleFont(_))));
        assert_eq!(fonts.width(&group, "x"), 0.0);
    }

    #[test]
    fn options_deserialize_from_lowercase_strings() {
        let options: FontOptions =
            serde_json::from_str(r#"{"antialiasing": "grayscale", "hinting": "full"}"#).unwrap();
        assert_eq!(options.antialiasing, Antialiasing::Grayscale);
        assert_eq!(options.hinting, Hinting::Full);
        assert_eq!(options.style, FontStyle::empty());
    }
}
