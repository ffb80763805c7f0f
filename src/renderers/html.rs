// menu-render-service/src/renderers/html.rs

use crate::error::{RenderError, Result};
use crate::models::{ColorPalette, FontSettings, MenuCategory, RenderJob};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::{debug, info};

const TEMPLATES: &[(&str, &str)] = &[
    ("classic", include_str!("../../templates/classic.html.hbs")),
    ("modern", include_str!("../../templates/modern.html.hbs")),
];

const HEAD_PARTIAL: &str = include_str!("../../templates/partials/head.html.hbs");

const RTL_LANGUAGES: &[&str] = &["ar", "fa", "he", "ur", "ps", "sd", "ug", "yi"];

const DEFAULT_LTR_FONT: (&str, &str) = ("Inter", "fonts/Inter-Regular.ttf");
const DEFAULT_RTL_FONT: (&str, &str) = ("Cairo", "fonts/Cairo-Regular.ttf");
const DEFAULT_FONT_SIZE_PT: f64 = 11.0;

/// Turns a render job into a self-contained HTML document.
///
/// Output is a pure function of the job: no clocks, no random ordering, so
/// two renders of the same job are byte-identical.
pub struct HtmlRenderer {
    handlebars: Handlebars<'static>,
    base_href: String,
}

impl HtmlRenderer {
    pub fn new(base_href: impl Into<String>) -> Result<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        handlebars.register_partial("head", HEAD_PARTIAL)?;
        for (name, source) in TEMPLATES {
            handlebars.register_template_string(name, *source)?;
        }

        Ok(Self {
            handlebars,
            base_href: base_href.into(),
        })
    }

    pub fn template_ids(&self) -> Vec<&'static str> {
        TEMPLATES.iter().map(|(name, _)| *name).collect()
    }

    pub fn render(&self, job: &RenderJob) -> Result<String> {
        validate(job)?;
        if !self.handlebars.has_template(&job.template_id) {
            return Err(RenderError::InvalidInput(format!(
                "unknown template '{}'",
                job.template_id
            )));
        }

        let document = MenuDocument::build(job, &self.base_href);
        debug!(
            template = %job.template_id,
            dir = document.dir,
            categories = document.categories.len(),
            "Rendering menu template"
        );

        let html = self.handlebars.render(&job.template_id, &document)?;

        info!(
            template = %job.template_id,
            language = %document.lang,
            size_kb = html.len() / 1024,
            "Menu HTML generated"
        );

        Ok(html)
    }
}

/// Render-relevant completeness checks; shape is the data provider's job.
fn validate(job: &RenderJob) -> Result<()> {
    if job.restaurant.name.trim().is_empty() {
        return Err(RenderError::InvalidInput(
            "restaurant name is missing".to_string(),
        ));
    }
    if job.categories.is_empty() {
        return Err(RenderError::InvalidInput(
            "menu has no categories".to_string(),
        ));
    }
    if !job.categories.iter().any(has_printable_items) {
        return Err(RenderError::InvalidInput(
            "no category contains an available, priced item".to_string(),
        ));
    }
    Ok(())
}

fn has_printable_items(category: &MenuCategory) -> bool {
    category.items.iter().any(|item| item.is_printable())
}

pub fn is_rtl(language: &str) -> bool {
    let primary = language
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    RTL_LANGUAGES.contains(&primary.as_str())
}

#[derive(Serialize)]
struct MenuDocument<'a> {
    lang: String,
    dir: &'static str,
    base_href: &'a str,
    page: PageStyle,
    fonts: Vec<FontFace>,
    body_font: String,
    heading_font: String,
    font_size: String,
    colors: Colors,
    background_image: Option<String>,
    rows: RowView,
    restaurant: RestaurantView<'a>,
    categories: Vec<CategoryView<'a>>,
}

#[derive(Serialize)]
struct PageStyle {
    size: &'static str,
    margin: String,
}

#[derive(Serialize, PartialEq)]
struct FontFace {
    family: String,
    src: String,
    format: &'static str,
}

#[derive(Serialize)]
struct Colors {
    primary: String,
    secondary: String,
    accent: String,
    background: String,
    text: String,
    divider: String,
    price: String,
}

#[derive(Serialize)]
struct RowView {
    show_dividers: bool,
    compact: bool,
}

#[derive(Serialize)]
struct RestaurantView<'a> {
    name: &'a str,
    logo_url: Option<&'a str>,
    address: Option<&'a str>,
    phone: Option<&'a str>,
}

#[derive(Serialize)]
struct CategoryView<'a> {
    name: &'a str,
    description: Option<&'a str>,
    items: Vec<ItemView<'a>>,
}

#[derive(Serialize)]
struct ItemView<'a> {
    name: &'a str,
    description: Option<&'a str>,
    price: String,
    featured: bool,
}

impl<'a> MenuDocument<'a> {
    fn build(job: &'a RenderJob, base_href: &'a str) -> Self {
        let lang = match job.language.trim() {
            "" => "en".to_string(),
            lang => lang.to_string(),
        };
        let rtl = is_rtl(&lang);
        let font_settings = lookup_fonts(job, &lang);

        let (default_family, default_source) = if rtl {
            DEFAULT_RTL_FONT
        } else {
            DEFAULT_LTR_FONT
        };
        let body_font = font_settings
            .and_then(|settings| safe_font_family(&settings.family))
            .unwrap_or_else(|| default_family.to_string());
        // The bundled face backs its own family even when only the name is given.
        let bundled = |family: &str| {
            family
                .eq_ignore_ascii_case(default_family)
                .then(|| default_source.to_string())
        };
        let body_source = font_settings
            .and_then(|settings| settings.source.as_deref())
            .and_then(safe_url)
            .or_else(|| bundled(&body_font));
        let heading_font = font_settings
            .and_then(|settings| settings.heading_family.as_deref())
            .and_then(safe_font_family)
            .unwrap_or_else(|| body_font.clone());
        let heading_source = font_settings
            .and_then(|settings| settings.heading_source.as_deref())
            .and_then(safe_url)
            .or_else(|| bundled(&heading_font));

        let mut fonts = Vec::new();
        push_font_face(&mut fonts, &body_font, body_source);
        push_font_face(&mut fonts, &heading_font, heading_source);

        let size_pt = font_settings
            .and_then(|settings| settings.size_pt)
            .filter(|size| size.is_finite() && *size >= 6.0 && *size <= 36.0)
            .unwrap_or(DEFAULT_FONT_SIZE_PT);

        let customizations = &job.customizations;
        let mut colors = Colors::from_palette(&job.restaurant.palette);
        if let Some(color) = customizations.page_background.color.as_deref().and_then(safe_color) {
            colors.background = color;
        }
        if let Some(color) = customizations.rows.divider_color.as_deref().and_then(safe_color) {
            colors.divider = color;
        }
        if let Some(color) = customizations.rows.price_color.as_deref().and_then(safe_color) {
            colors.price = color;
        }

        let currency = job.restaurant.currency.trim();
        let categories = job
            .categories
            .iter()
            .filter(|category| has_printable_items(category))
            .map(|category| CategoryView {
                name: &category.name,
                description: non_blank(category.description.as_deref()),
                items: category
                    .items
                    .iter()
                    .filter(|item| item.is_printable())
                    .map(|item| ItemView {
                        name: &item.name,
                        description: non_blank(item.description.as_deref()),
                        price: format_price(currency, item.price.unwrap_or_default()),
                        featured: item.featured,
                    })
                    .collect(),
            })
            .collect();

        let margins = &job.margins;
        Self {
            dir: if rtl { "rtl" } else { "ltr" },
            lang,
            base_href,
            page: PageStyle {
                size: job.page_format.css_size(),
                margin: format!(
                    "{}mm {}mm {}mm {}mm",
                    css_number(margins.top),
                    css_number(margins.right),
                    css_number(margins.bottom),
                    css_number(margins.left)
                ),
            },
            fonts,
            body_font,
            heading_font,
            font_size: format!("{}pt", css_number(size_pt)),
            colors,
            background_image: customizations
                .page_background
                .image_url
                .as_deref()
                .and_then(safe_url),
            rows: RowView {
                show_dividers: customizations.rows.show_dividers,
                compact: customizations.rows.compact,
            },
            restaurant: RestaurantView {
                name: job.restaurant.name.trim(),
                logo_url: non_blank(job.restaurant.logo_url.as_deref()),
                address: non_blank(job.restaurant.address.as_deref()),
                phone: non_blank(job.restaurant.phone.as_deref()),
            },
            categories,
        }
    }
}

impl Colors {
    fn from_palette(palette: &ColorPalette) -> Self {
        let pick = |value: &Option<String>, fallback: &str| {
            value
                .as_deref()
                .and_then(safe_color)
                .unwrap_or_else(|| fallback.to_string())
        };
        let secondary = pick(&palette.secondary, "#6b7280");
        let accent = pick(&palette.accent, "#b45309");
        Self {
            primary: pick(&palette.primary, "#1f2937"),
            background: pick(&palette.background, "#ffffff"),
            text: pick(&palette.text, "#111827"),
            divider: secondary.clone(),
            price: accent.clone(),
            secondary,
            accent,
        }
    }
}

/// Exact language first, then its primary subtag.
fn lookup_fonts<'a>(job: &'a RenderJob, lang: &str) -> Option<&'a FontSettings> {
    let fonts = &job.customizations.fonts;
    fonts.get(lang).or_else(|| {
        let primary = lang.split(['-', '_']).next()?;
        fonts.get(primary)
    })
}

fn push_font_face(fonts: &mut Vec<FontFace>, family: &str, src: Option<String>) {
    let Some(src) = src else {
        return;
    };
    if fonts.iter().any(|face| face.family == family) {
        return;
    }
    fonts.push(FontFace {
        family: family.to_string(),
        format: font_format(&src),
        src,
    });
}

fn font_format(src: &str) -> &'static str {
    let lower = src.to_ascii_lowercase();
    if lower.ends_with(".woff2") {
        "woff2"
    } else if lower.ends_with(".woff") {
        "woff"
    } else if lower.ends_with(".otf") {
        "opentype"
    } else {
        "truetype"
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn safe_font_family(family: &str) -> Option<String> {
    let cleaned: String = family
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let cleaned = cleaned.trim();
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

fn safe_color(value: &str) -> Option<String> {
    let value = value.trim();
    let hex = value.strip_prefix('#')?;
    let valid = matches!(hex.len(), 3 | 4 | 6 | 8) && hex.chars().all(|c| c.is_ascii_hexdigit());
    valid.then(|| value.to_ascii_lowercase())
}

/// URLs end up inside `url('...')`; anything that could close it is dropped.
fn safe_url(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty()
        || value
            .chars()
            .any(|c| matches!(c, '\'' | '"' | '(' | ')' | '\\' | '<' | '>') || c.is_whitespace())
    {
        return None;
    }
    Some(value.to_string())
}

fn css_number(value: f64) -> String {
    if !value.is_finite() || value <= 0.0 {
        return "0".to_string();
    }
    let formatted = format!("{:.2}", value);
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

fn format_price(currency: &str, price: f64) -> String {
    match currency.to_ascii_uppercase().as_str() {
        "USD" => format!("${:.2}", price),
        "EUR" => format!("€{:.2}", price),
        "GBP" => format!("£{:.2}", price),
        "" => format!("{:.2}", price),
        code => format!("{} {:.2}", code, price),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MenuItem, RestaurantSnapshot};

    const BASE: &str = "https://assets.menu-render.local/";

    fn item(name: &str, price: Option<f64>, available: bool) -> MenuItem {
        MenuItem {
            name: name.to_string(),
            description: None,
            price,
            available,
            featured: false,
        }
    }

    fn job(language: &str, items: Vec<MenuItem>) -> RenderJob {
        RenderJob {
            template_id: "classic".to_string(),
            language: language.to_string(),
            restaurant: RestaurantSnapshot {
                name: "Bayt Al Qahwa".to_string(),
                logo_url: None,
                address: Some("12 Harbour Road".to_string()),
                phone: None,
                currency: "SAR".to_string(),
                palette: ColorPalette::default(),
            },
            categories: vec![MenuCategory {
                name: "Coffee".to_string(),
                description: None,
                items,
            }],
            customizations: Default::default(),
            page_format: Default::default(),
            margins: Default::default(),
        }
    }

    fn renderer() -> HtmlRenderer {
        HtmlRenderer::new(BASE).expect("templates compile")
    }

    #[test]
    fn identical_jobs_render_identical_html() {
        let job = job("en", vec![item("Espresso", Some(3.5), true)]);
        let renderer = renderer();
        let first = renderer.render(&job).unwrap();
        let second = renderer.render(&job.clone()).unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("<!DOCTYPE html>"));
    }

    #[test]
    fn arabic_renders_right_to_left_with_rtl_font() {
        let html = renderer()
            .render(&job("ar", vec![item("قهوة", Some(15.0), true)]))
            .unwrap();
        assert!(html.contains(r#"<html lang="ar" dir="rtl">"#));
        assert!(html.contains("font-family: 'Cairo';"));
        assert!(html.contains("url('fonts/Cairo-Regular.ttf') format('truetype')"));
        assert!(html.contains("SAR 15.00"));
        assert!(html.contains(&format!(r#"<base href="{}">"#, BASE)));
    }

    #[test]
    fn default_family_without_source_uses_bundled_face() {
        let mut job = job("ar", vec![item("قهوة", Some(15.0), true)]);
        job.customizations.fonts.insert(
            "ar".to_string(),
            FontSettings {
                family: "Cairo".to_string(),
                source: None,
                heading_family: Some("Amiri".to_string()),
                heading_source: None,
                size_pt: None,
            },
        );

        let html = renderer().render(&job).unwrap();
        assert!(html.contains("url('fonts/Cairo-Regular.ttf') format('truetype')"));
        assert!(html.contains("'Amiri'"));
        assert_eq!(html.matches("@font-face").count(), 1);
    }

    #[test]
    fn all_templates_compile_and_render() {
        let renderer = renderer();
        for template in renderer.template_ids() {
            let mut job = job("en-GB", vec![item("Flat white", Some(4.0), true)]);
            job.template_id = template.to_string();
            let html = renderer.render(&job).unwrap();
            assert!(html.contains(&format!("template-{}", template)));
            assert!(html.contains("size: A4;"));
            assert!(html.contains(r#"dir="ltr""#));
        }
    }

    #[test]
    fn rejects_jobs_without_printable_items() {
        let renderer = renderer();

        let unavailable = job("en", vec![item("Mocha", Some(5.0), false)]);
        assert!(matches!(
            renderer.render(&unavailable),
            Err(RenderError::InvalidInput(_))
        ));

        let unpriced = job("en", vec![item("Mocha", None, true)]);
        assert!(matches!(
            renderer.render(&unpriced),
            Err(RenderError::InvalidInput(_))
        ));

        let mut empty = job("en", vec![]);
        empty.categories.clear();
        assert!(matches!(
            renderer.render(&empty),
            Err(RenderError::InvalidInput(_))
        ));

        let mut nameless = job("en", vec![item("Mocha", Some(5.0), true)]);
        nameless.restaurant.name = "   ".to_string();
        assert!(matches!(
            renderer.render(&nameless),
            Err(RenderError::InvalidInput(_))
        ));
    }

    #[test]
    fn unknown_template_is_invalid_input() {
        let mut job = job("en", vec![item("Latte", Some(4.0), true)]);
        job.template_id = "baroque".to_string();
        match renderer().render(&job) {
            Err(RenderError::InvalidInput(reason)) => assert!(reason.contains("baroque")),
            other => panic!("expected invalid input, got {:?}", other),
        }
    }

    #[test]
    fn hidden_items_are_left_out_and_text_is_escaped() {
        let html = renderer()
            .render(&job(
                "en",
                vec![
                    item("<script>alert(1)</script>", Some(2.0), true),
                    item("Sold out special", Some(9.0), false),
                ],
            ))
            .unwrap();
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("Sold out special"));
    }

    #[test]
    fn unsafe_style_values_fall_back_to_defaults() {
        let mut job = job("en", vec![item("Latte", Some(4.0), true)]);
        job.restaurant.palette.primary = Some("red; } body { display:none".to_string());
        job.customizations.page_background.image_url =
            Some("https://x.test/a.png'); background: url('evil".to_string());
        job.customizations.fonts.insert(
            "en".to_string(),
            FontSettings {
                family: "Playfair'; }".to_string(),
                source: Some("fonts/Playfair.woff2".to_string()),
                heading_family: None,
                heading_source: None,
                size_pt: Some(200.0),
            },
        );

        let html = renderer().render(&job).unwrap();
        assert!(!html.contains("display:none"));
        assert!(!html.contains("evil"));
        assert!(html.contains("border-bottom: 2px solid #1f2937"));
        assert!(html.contains("font-family: 'Playfair';"));
        assert!(html.contains("format('woff2')"));
        assert!(html.contains("font-size: 11pt;"));
    }

    #[test]
    fn regional_language_uses_primary_subtag() {
        assert!(is_rtl("ar-SA"));
        assert!(is_rtl("HE"));
        assert!(!is_rtl("en-US"));
        assert!(!is_rtl(""));
    }

    #[test]
    fn price_formatting() {
        assert_eq!(format_price("usd", 4.5), "$4.50");
        assert_eq!(format_price("EUR", 12.0), "€12.00");
        assert_eq!(format_price("AED", 15.0), "AED 15.00");
        assert_eq!(css_number(12.5), "12.5");
        assert_eq!(css_number(10.0), "10");
        assert_eq!(css_number(-3.0), "0");
    }
}
