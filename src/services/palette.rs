//! Palette: the closed set of placeable colors.
//!
//! Colors are stored in the grid as their index into the palette, so the
//! palette is capped at 256 entries. One color is the base (the color of an
//! untouched cell); a non-empty subset is marked secret.

/// Colors available when `GRID_PALETTE` is not set.
pub const DEFAULT_COLORS: &[&str] = &[
    "black",
    "white",
    "red",
    "green",
    "blue",
    "orange",
    "yellow",
    "purple",
    "mediumpurple",
    "fuchsia",
    "rebeccapurple",
    "teal",
    "tan",
];

/// Secret subset used when `GRID_SECRET_COLORS` is not set.
pub const DEFAULT_SECRET_COLORS: &[&str] = &["mediumpurple", "fuchsia", "rebeccapurple", "teal", "tan"];

pub const DEFAULT_BASE_COLOR: &str = "black";

/// Palette index of a color.
pub type ColorIndex = u8;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PaletteError {
    #[error("palette is empty")]
    Empty,
    #[error("palette has {0} colors (max 256)")]
    TooLarge(usize),
    #[error("duplicate palette color: {0}")]
    Duplicate(String),
    #[error("base color not in palette: {0}")]
    UnknownBase(String),
    #[error("secret color not in palette: {0}")]
    UnknownSecret(String),
    #[error("secret color set is empty")]
    NoSecrets,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<String>,
    secret: Vec<bool>,
    base: ColorIndex,
}

impl Palette {
    /// Build a palette, checking that `base` and every secret are members.
    ///
    /// # Errors
    ///
    /// Returns a `PaletteError` describing the first invalid input.
    pub fn new<C, S>(colors: C, secrets: S, base: &str) -> Result<Self, PaletteError>
    where
        C: IntoIterator,
        C::Item: Into<String>,
        S: IntoIterator,
        S::Item: AsRef<str>,
    {
        let colors: Vec<String> = colors.into_iter().map(Into::into).collect();
        if colors.is_empty() {
            return Err(PaletteError::Empty);
        }
        if colors.len() > usize::from(ColorIndex::MAX) + 1 {
            return Err(PaletteError::TooLarge(colors.len()));
        }
        for (i, color) in colors.iter().enumerate() {
            if colors[..i].contains(color) {
                return Err(PaletteError::Duplicate(color.clone()));
            }
        }

        let mut palette = Self { secret: vec![false; colors.len()], colors, base: 0 };
        palette.base = palette
            .index_of(base)
            .ok_or_else(|| PaletteError::UnknownBase(base.to_owned()))?;

        for name in secrets {
            let name = name.as_ref();
            let idx = palette
                .index_of(name)
                .ok_or_else(|| PaletteError::UnknownSecret(name.to_owned()))?;
            palette.secret[usize::from(idx)] = true;
        }
        if !palette.secret.contains(&true) {
            return Err(PaletteError::NoSecrets);
        }

        Ok(palette)
    }

    /// Index of `name`, or `None` if it is not a palette color.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<ColorIndex> {
        self.colors
            .iter()
            .position(|c| c == name)
            .and_then(|pos| ColorIndex::try_from(pos).ok())
    }

    /// Name for an index produced by this palette.
    #[must_use]
    pub fn name(&self, idx: ColorIndex) -> &str {
        self.colors
            .get(usize::from(idx))
            .map_or_else(|| self.base_name(), String::as_str)
    }

    #[must_use]
    pub fn is_secret(&self, name: &str) -> bool {
        self.index_of(name)
            .is_some_and(|idx| self.secret[usize::from(idx)])
    }

    #[must_use]
    pub fn base(&self) -> ColorIndex {
        self.base
    }

    #[must_use]
    pub fn base_name(&self) -> &str {
        &self.colors[usize::from(self.base)]
    }

    pub fn colors(&self) -> impl Iterator<Item = &str> {
        self.colors.iter().map(String::as_str)
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            colors: DEFAULT_COLORS.iter().map(|c| (*c).to_owned()).collect(),
            secret: DEFAULT_COLORS
                .iter()
                .map(|c| DEFAULT_SECRET_COLORS.contains(c))
                .collect(),
            base: 0,
        }
    }
}

#[cfg(test)]
#[path = "palette_test.rs"]
mod tests;
