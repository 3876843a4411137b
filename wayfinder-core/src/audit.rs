// Passive accessibility and performance checks for settled pages

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use wayfinder_scanner::document::{Impact, PageSnapshot, PerfSample, Probe, Violation};
use wayfinder_scanner::error::ProbeError;

/// Audits the snapshot's HTML without touching the live document.
#[derive(Debug, Clone, Default)]
pub struct StaticAuditProbe;

impl StaticAuditProbe {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Probe for StaticAuditProbe {
    async fn audit(&self, page: &PageSnapshot) -> Result<Vec<Violation>, ProbeError> {
        Ok(analyze_page(&page.html))
    }

    async fn metrics(&self, page: &PageSnapshot) -> Result<PerfSample, ProbeError> {
        Ok(measure_page(page))
    }
}

fn selector(css: &str) -> Result<Selector, ProbeError> {
    Selector::parse(css).map_err(|e| ProbeError(format!("selector '{}': {}", css, e)))
}

fn describe(el: &ElementRef) -> String {
    let value = el.value();
    let mut target = value.name().to_string();
    if let Some(id) = value.id() {
        target.push('#');
        target.push_str(id);
    } else if let Some(class) = value.classes().next() {
        target.push('.');
        target.push_str(class);
    }
    target
}

fn has_text(el: &ElementRef) -> bool {
    el.text().any(|t| !t.trim().is_empty())
}

fn has_attr_text(el: &ElementRef, name: &str) -> bool {
    el.value().attr(name).is_some_and(|v| !v.trim().is_empty())
}

fn has_named_image(el: &ElementRef) -> bool {
    Selector::parse("img[alt]").is_ok_and(|img| {
        el.select(&img)
            .any(|i| i.value().attr("alt").is_some_and(|a| !a.trim().is_empty()))
    })
}

fn is_named(el: &ElementRef) -> bool {
    has_text(el)
        || has_attr_text(el, "aria-label")
        || has_attr_text(el, "aria-labelledby")
        || has_attr_text(el, "title")
        || has_named_image(el)
}

pub fn check_image_alt(document: &Html) -> Vec<Violation> {
    let Ok(images) = selector("img") else {
        return Vec::new();
    };
    document
        .select(&images)
        .filter(|img| {
            let value = img.value();
            value.attr("alt").is_none()
                && value.attr("role") != Some("presentation")
                && value.attr("aria-hidden") != Some("true")
        })
        .map(|img| Violation {
            rule: "image-alt".to_string(),
            impact: Impact::Critical,
            description: "Images must have alternate text".to_string(),
            help: "Add an alt attribute; use alt=\"\" for decorative images".to_string(),
            target: Some(describe(&img)),
        })
        .collect()
}

pub fn check_document_language(document: &Html) -> Vec<Violation> {
    let has_lang = selector("html")
        .ok()
        .and_then(|s| document.select(&s).next())
        .is_some_and(|html| has_attr_text(&html, "lang"));

    if has_lang {
        return Vec::new();
    }
    vec![Violation {
        rule: "html-has-lang".to_string(),
        impact: Impact::Serious,
        description: "The <html> element must have a lang attribute".to_string(),
        help: "Set lang on the root element, for example <html lang=\"en\">".to_string(),
        target: Some("html".to_string()),
    }]
}

pub fn check_document_title(document: &Html) -> Vec<Violation> {
    let has_title = selector("title")
        .ok()
        .and_then(|s| document.select(&s).next())
        .is_some_and(|t| has_text(&t));

    if has_title {
        return Vec::new();
    }
    vec![Violation {
        rule: "document-title".to_string(),
        impact: Impact::Serious,
        description: "Documents must have a non-empty <title> element".to_string(),
        help: "Give every page a title describing its purpose".to_string(),
        target: Some("head".to_string()),
    }]
}

pub fn check_button_names(document: &Html) -> Vec<Violation> {
    let Ok(buttons) = selector("button, [role=button], input[type=button], input[type=submit]") else {
        return Vec::new();
    };
    document
        .select(&buttons)
        .filter(|button| !is_named(button) && !has_attr_text(button, "value"))
        .map(|button| Violation {
            rule: "button-name".to_string(),
            impact: Impact::Critical,
            description: "Buttons must have discernible text".to_string(),
            help: "Add visible text, an aria-label or a title to the button".to_string(),
            target: Some(describe(&button)),
        })
        .collect()
}

pub fn check_link_names(document: &Html) -> Vec<Violation> {
    let Ok(links) = selector("a[href]") else {
        return Vec::new();
    };
    document
        .select(&links)
        .filter(|link| !is_named(link))
        .map(|link| Violation {
            rule: "link-name".to_string(),
            impact: Impact::Serious,
            description: "Links must have discernible text".to_string(),
            help: "Add link text, an aria-label or an image with alt text".to_string(),
            target: Some(describe(&link)),
        })
        .collect()
}

pub fn check_form_labels(document: &Html) -> Vec<Violation> {
    let (Ok(fields), Ok(labels)) = (
        selector("input, select, textarea"),
        selector("label[for]"),
    ) else {
        return Vec::new();
    };

    let labelled: HashSet<&str> = document
        .select(&labels)
        .filter_map(|label| label.value().attr("for"))
        .collect();

    document
        .select(&fields)
        .filter(|field| {
            let value = field.value();
            let input_type = value.attr("type").unwrap_or("text").to_lowercase();
            !matches!(
                input_type.as_str(),
                "hidden" | "submit" | "button" | "reset" | "image"
            )
        })
        .filter(|field| {
            let wrapped = field
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|a| a.value().name() == "label");
            let for_id = field.value().id().is_some_and(|id| labelled.contains(id));
            !(wrapped
                || for_id
                || has_attr_text(field, "aria-label")
                || has_attr_text(field, "aria-labelledby")
                || has_attr_text(field, "title"))
        })
        .map(|field| Violation {
            rule: "label".to_string(),
            impact: Impact::Critical,
            description: "Form elements must have labels".to_string(),
            help: "Associate a <label> with the field or give it an aria-label".to_string(),
            target: Some(describe(&field)),
        })
        .collect()
}

/// Runs every check against a page's markup.
pub fn analyze_page(html: &str) -> Vec<Violation> {
    let document = Html::parse_document(html);
    let mut all_violations = Vec::new();

    all_violations.extend(check_document_language(&document));
    all_violations.extend(check_document_title(&document));
    all_violations.extend(check_image_alt(&document));
    all_violations.extend(check_button_names(&document));
    all_violations.extend(check_link_names(&document));
    all_violations.extend(check_form_labels(&document));

    all_violations
}

pub fn measure_page(page: &PageSnapshot) -> PerfSample {
    let document = Html::parse_document(&page.html);
    let count = |css: &str| {
        Selector::parse(css)
            .map(|s| document.select(&s).count())
            .unwrap_or(0)
    };

    PerfSample {
        load_time_ms: page.load_time.as_millis() as u64,
        transfer_bytes: page.html.len(),
        element_count: count("*"),
        script_count: count("script"),
        form_count: count("form"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_prefers_id() {
        let document = Html::parse_fragment(r#"<button id="save" class="btn">Save</button>"#);
        let button = document
            .select(&Selector::parse("button").unwrap())
            .next()
            .unwrap();
        assert_eq!(describe(&button), "button#save");
    }

    #[test]
    fn test_icon_button_with_alt_is_named() {
        let document =
            Html::parse_fragment(r#"<button><img src="x.png" alt="Delete"></button>"#);
        assert!(check_button_names(&document).is_empty());
    }
}
