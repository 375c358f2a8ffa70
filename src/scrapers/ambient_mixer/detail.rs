//! Mix detail page parser.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use super::error::ParseError;
use super::MixContext;

static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div#home_description_top h1").expect("static selector"));
static DESCRIPTION: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div#home_description_audio_text p").expect("static selector")
});
static BREADCRUMBS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div#bread_crumbs a span").expect("static selector"));
static DETAILS_LINK: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div#mixer_details .keep_left:last-child a").expect("static selector")
});

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Parse title, description, breadcrumbs and audio id from a detail page.
pub fn parse_detail(html: &str) -> Result<MixContext, ParseError> {
    let document = Html::parse_document(html);

    let title = document
        .select(&TITLE)
        .next()
        .map(text_of)
        .filter(|t| !t.is_empty())
        .ok_or(ParseError::MissingElement("title heading"))?;

    let description = document
        .select(&DESCRIPTION)
        .next()
        .map(text_of)
        .ok_or(ParseError::MissingElement("description paragraph"))?;

    let categories = document
        .select(&BREADCRUMBS)
        .map(text_of)
        .filter(|c| !c.is_empty())
        .collect();

    let href = document
        .select(&DETAILS_LINK)
        .next()
        .and_then(|a| a.value().attr("href"))
        .ok_or(ParseError::MissingElement("details link"))?;

    Ok(MixContext {
        title,
        description,
        categories,
        audio_id: audio_id_from_href(href)?,
    })
}

/// Numeric id from the last path segment of the details link.
pub fn audio_id_from_href(href: &str) -> Result<u64, ParseError> {
    let path = href.split(['?', '#']).next().unwrap_or("");
    let segment = path.trim_end_matches('/').rsplit('/').next().unwrap_or("");
    segment
        .parse::<u64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ParseError::InvalidAudioId(href.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail_page(description: Option<&str>) -> String {
        let description = description
            .map(|d| format!("<p>  {}  </p><p>second</p>", d))
            .unwrap_or_default();
        format!(
            r#"<html><body>
              <div id="bread_crumbs">
                <a href="/"><span> Nature </span></a> &gt;
                <a href="/forest"><span>Forest</span></a>
                <a href="/empty"><span>  </span></a>
              </div>
              <div id="home_description_top"><h1>
                Forest
              </h1></div>
              <div id="home_description_audio_text">{}</div>
              <div id="mixer_details">
                <div class="keep_left"><a href="/user/someone">someone</a></div>
                <div class="keep_left"><a href="/audio-template/details/42">details</a></div>
              </div>
            </body></html>"#,
            description
        )
    }

    #[test]
    fn test_parse_detail() {
        let context = parse_detail(&detail_page(Some("Deep woods at night"))).unwrap();
        assert_eq!(context.title, "Forest");
        assert_eq!(context.description, "Deep woods at night");
        assert_eq!(context.categories, vec!["Nature", "Forest"]);
        assert_eq!(context.audio_id, 42);
    }

    #[test]
    fn test_missing_description_is_fatal() {
        let err = parse_detail(&detail_page(None)).unwrap_err();
        assert!(matches!(
            err,
            ParseError::MissingElement("description paragraph")
        ));
    }

    #[test]
    fn test_missing_title_is_fatal() {
        let html = detail_page(Some("x")).replace("<h1>", "<h2>").replace("</h1>", "</h2>");
        assert!(matches!(
            parse_detail(&html),
            Err(ParseError::MissingElement("title heading"))
        ));
    }

    #[test]
    fn test_audio_id_from_href() {
        assert_eq!(audio_id_from_href("/audio-template/details/42").unwrap(), 42);
        assert_eq!(
            audio_id_from_href("https://www.ambient-mixer.com/details/7/?ref=x").unwrap(),
            7
        );
        assert!(audio_id_from_href("/details/abc").is_err());
        assert!(audio_id_from_href("/details/0").is_err());
        assert!(audio_id_from_href("").is_err());
    }
}
