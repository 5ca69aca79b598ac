//! Reader settings and the style descriptor derived from them
//!
//! Settings are process-wide: one record shared by every open book.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const MIN_FONT_SIZE: u16 = 50;
pub const MAX_FONT_SIZE: u16 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Sepia,
    Night,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontFamily {
    Serif,
    Sans,
}

impl Theme {
    pub fn name(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Sepia => "sepia",
            Theme::Night => "night",
        }
    }

    fn palette(&self) -> Palette {
        match self {
            Theme::Light => Palette {
                text: "#1a1a1a",
                background: "#ffffff",
                link: "#1a5fb4",
                selection: "rgba(255, 213, 0, 0.35)",
                image_filter: None,
            },
            Theme::Sepia => Palette {
                text: "#5b4636",
                background: "#f4ecd8",
                link: "#8b4513",
                selection: "rgba(181, 137, 0, 0.30)",
                image_filter: None,
            },
            Theme::Night => Palette {
                text: "#e0e0e0",
                background: "#121212",
                link: "#8ab4f8",
                selection: "rgba(138, 180, 248, 0.35)",
                image_filter: Some("brightness(0.8) contrast(1.2)"),
            },
        }
    }
}

impl FontFamily {
    pub fn css_stack(&self) -> &'static str {
        match self {
            FontFamily::Serif => "Georgia, 'Times New Roman', serif",
            FontFamily::Sans => "-apple-system, 'Helvetica Neue', Arial, sans-serif",
        }
    }
}

struct Palette {
    text: &'static str,
    background: &'static str,
    link: &'static str,
    selection: &'static str,
    image_filter: Option<&'static str>,
}

/// User-facing typography and colour settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderSettings {
    pub theme: Theme,
    /// Percentage of the book's base font size, clamped to [50, 200]
    #[serde(rename = "fontSize")]
    pub font_size: u16,
    #[serde(rename = "fontFamily")]
    pub font_family: FontFamily,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            font_size: 100,
            font_family: FontFamily::Serif,
        }
    }
}

impl ReaderSettings {
    pub fn with_theme(mut self, theme: Theme) -> Self {
        self.theme = theme;
        self
    }

    pub fn with_font_size(mut self, percent: u16) -> Self {
        self.font_size = percent.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);
        self
    }

    pub fn with_font_family(mut self, family: FontFamily) -> Self {
        self.font_family = family;
        self
    }

    /// Re-apply the font size bound to a record read from storage
    pub fn normalized(self) -> Self {
        let font_size = self.font_size;
        self.with_font_size(font_size)
    }

    /// Name under which this combination is registered with the engine
    pub fn style_name(&self) -> String {
        let family = match self.font_family {
            FontFamily::Serif => "serif",
            FontFamily::Sans => "sans",
        };
        format!("{}-{}-{}", self.theme.name(), family, self.font_size)
    }

    /// Structured style descriptor for the rendering engine
    pub fn style(&self) -> StyleDescriptor {
        let palette = self.theme.palette();
        let mut style = StyleDescriptor::default();

        style
            .rule("body")
            .set("color", palette.text)
            .set("background", palette.background)
            .set("font-family", format!("{} !important", self.font_family.css_stack()))
            .set("font-size", format!("{}% !important", self.font_size));
        style.rule("p").set("font-family", "inherit !important");
        style.rule("a").set("color", palette.link);
        style.rule("::selection").set("background", palette.selection);
        if let Some(filter) = palette.image_filter {
            style.rule("img").set("filter", filter);
        }

        style
    }
}

/// Selector → declarations map, handed to the engine's style registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StyleDescriptor {
    pub rules: BTreeMap<String, BTreeMap<String, String>>,
}

/// Declarations of one selector
pub struct RuleBuilder<'a> {
    declarations: &'a mut BTreeMap<String, String>,
}

impl<'a> RuleBuilder<'a> {
    pub fn set(self, property: &str, value: impl Into<String>) -> Self {
        self.declarations.insert(property.to_string(), value.into());
        self
    }
}

impl StyleDescriptor {
    pub fn rule(&mut self, selector: &str) -> RuleBuilder<'_> {
        RuleBuilder {
            declarations: self.rules.entry(selector.to_string()).or_default(),
        }
    }

    pub fn get(&self, selector: &str, property: &str) -> Option<&str> {
        self.rules
            .get(selector)
            .and_then(|declarations| declarations.get(property))
            .map(String::as_str)
    }
}
