//! Book metadata enrichment
//!
//! Resolves a book (by ISBN or by title and author) to a detail page on the book site,
//! then reads the structured-data block embedded in that page.

use crate::catalog::ScrapedBook;
use crate::config::ScrapeConfig;
use crate::dates::{canonicalize, DateInput};
use crate::error::{Error, Result};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use scraper::{Html, Selector};
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

type DirectLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Source of book metadata
#[async_trait]
pub trait BookLookup: Send + Sync {
    /// Look up a book by title and (optionally) author
    async fn by_title_author(&self, title: &str, author: Option<&str>) -> Result<ScrapedBook>;

    /// Look up a book by ISBN or another identifier the site can search on
    async fn by_identifier(&self, identifier: &str) -> Result<ScrapedBook>;
}

/// HTTP scraper for the book-detail site
#[derive(Clone)]
pub struct Scraper {
    client: Client,
    base_url: Url,
    limiter: Arc<DirectLimiter>,
}

impl Scraper {
    pub fn new(config: &ScrapeConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout())
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = Url::parse(&config.base_url)?;
        let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let limiter = Arc::new(RateLimiter::direct(Quota::per_second(rps)));

        Ok(Self {
            client,
            base_url,
            limiter,
        })
    }

    /// Search URL for a raw query value
    fn search_url(&self, query: &str) -> Result<Url> {
        let mut url = self.base_url.join("search")?;
        url.set_query(Some(&format!("q={}", query)));
        Ok(url)
    }

    /// Fetch a page, returning the final URL after redirects and the body
    async fn fetch_html(&self, url: &Url) -> Result<(Url, String)> {
        self.limiter.until_ready().await;
        debug!("Fetching: {}", url);

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::fetch(url.as_str(), format!("HTTP {}", status)));
        }
        let final_url = response.url().clone();
        let body = response.text().await?;
        Ok((final_url, body))
    }

    /// Fetch a detail page and extract its metadata
    pub async fn parse_detail_page(&self, url: &Url) -> Result<ScrapedBook> {
        let (final_url, html) = self.fetch_html(url).await?;
        parse_detail_html(final_url.as_str(), &html)
    }

    async fn follow_first_result(&self, search_url: &Url, html: &str) -> Result<ScrapedBook> {
        let link = first_result_link(html, &self.base_url)
            .ok_or_else(|| Error::scrape(search_url.as_str(), "no search result"))?;
        self.parse_detail_page(&link).await
    }
}

#[async_trait]
impl BookLookup for Scraper {
    async fn by_title_author(&self, title: &str, author: Option<&str>) -> Result<ScrapedBook> {
        let search_url = self.search_url(&search_query(title, author))?;
        info!("Searching for {:?} by {:?}", title, author);
        let (_, html) = self.fetch_html(&search_url).await?;
        self.follow_first_result(&search_url, &html).await
    }

    async fn by_identifier(&self, identifier: &str) -> Result<ScrapedBook> {
        let search_url = self.search_url(&search_query(identifier, None))?;
        info!("Searching for identifier {}", identifier);
        let (final_url, html) = self.fetch_html(&search_url).await?;

        // An exact identifier match lands directly on the detail page
        if has_structured_data(&html) {
            return parse_detail_html(final_url.as_str(), &html);
        }
        self.follow_first_result(&search_url, &html).await
    }
}

/// Build the search query value: lower-cased terms joined with `+`
pub fn search_query(title: &str, author: Option<&str>) -> String {
    let terms = title
        .split_whitespace()
        .chain(author.unwrap_or_default().split_whitespace());
    terms
        .map(|term| {
            url::form_urlencoded::byte_serialize(term.to_lowercase().as_bytes()).collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("+")
}

/// First book link on a search results page, resolved against `base`
pub fn first_result_link(html: &str, base: &Url) -> Option<Url> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(r#"[itemtype="http://schema.org/Book"] .bookTitle"#).ok()?;
    let href = document
        .select(&selector)
        .find_map(|el| el.value().attr("href"))?;
    base.join(href).ok()
}

fn next_data(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("script#__NEXT_DATA__").ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>())
}

fn has_structured_data(html: &str) -> bool {
    next_data(html).is_some_and(|text| !text.trim().is_empty())
}

/// Extract book metadata from a detail page's `__NEXT_DATA__` block
pub fn parse_detail_html(url: &str, html: &str) -> Result<ScrapedBook> {
    let fail = |reason: &str| Error::scrape(url, reason);

    let raw = next_data(html).ok_or_else(|| fail("no __NEXT_DATA__ block"))?;
    let data: Value = serde_json::from_str(&raw)
        .map_err(|e| fail(&format!("malformed __NEXT_DATA__: {}", e)))?;

    let page_props = &data["props"]["pageProps"];
    let apollo = page_props["apolloState"]
        .as_object()
        .ok_or_else(|| fail("no apolloState"))?;
    let book = apollo
        .values()
        .find(|v| v["__typename"] == "Book")
        .ok_or_else(|| fail("no Book entry in apolloState"))?;

    let title = str_field(book, "titleComplete")
        .or_else(|| str_field(book, "title"))
        .ok_or_else(|| fail("book has no title"))?;
    let details = book
        .get("details")
        .filter(|d| d.is_object())
        .ok_or_else(|| fail("book has no details"))?;

    let date_published = match details.get("publicationTime") {
        None | Some(Value::Null) => None,
        Some(value) => {
            let input = DateInput::from_json(value)
                .map_err(|e| fail(&format!("publication time: {}", e)))?;
            Some(canonicalize(input).map_err(|e| fail(&format!("publication time: {}", e)))?)
        }
    };

    let genres = book["bookGenres"]
        .as_array()
        .map(|genres| {
            genres
                .iter()
                .filter_map(|g| g["genre"]["name"].as_str())
                .map(str::to_lowercase)
                .collect()
        })
        .unwrap_or_default();

    let author = book["primaryContributorEdge"]["node"]["__ref"]
        .as_str()
        .and_then(|key| apollo.get(key))
        .and_then(|contributor| str_field(contributor, "name"));

    Ok(ScrapedBook {
        url: url.to_string(),
        goodreads_id: id_field(&page_props["params"]["book_id"]),
        title,
        author,
        image_url: str_field(book, "imageUrl"),
        description: str_field(book, "description"),
        isbn: str_field(details, "isbn"),
        isbn13: str_field(details, "isbn13"),
        asin: str_field(details, "asin"),
        date_published,
        publisher: str_field(details, "publisher"),
        genres,
        amazon_id: affiliate_id(book),
    })
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn id_field(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Marketplace id from the first secondary affiliate link,
/// e.g. `https://www.amazon.com/gp/product/B00B7NPRY8?tag=x` gives `B00B7NPRY8`
fn affiliate_id(book: &Value) -> Option<String> {
    let link = book["links({})"]["secondaryAffiliateLinks"][0]["url"].as_str()?;
    let segment = link.split('/').nth(5)?;
    let id = segment.split(&['?', '#'][..]).next()?;
    (!id.is_empty()).then(|| id.to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn detail_page(book_id: &str, title: &str, isbn: Option<&str>) -> String {
        let data = json!({
            "props": {
                "pageProps": {
                    "params": { "book_id": book_id },
                    "apolloState": {
                        "Contributor:kca://author/1": {
                            "__typename": "Contributor",
                            "name": "Frank Herbert"
                        },
                        "Book:kca://book/1": {
                            "__typename": "Book",
                            "titleComplete": title,
                            "description": "Spice and sand.",
                            "imageUrl": "https://images.example/dune.jpg",
                            "primaryContributorEdge": {
                                "node": { "__ref": "Contributor:kca://author/1" }
                            },
                            "details": {
                                "isbn": isbn,
                                "isbn13": "9780441013593",
                                "asin": null,
                                "publicationTime": 1_458_353_665_000i64,
                                "publisher": "Ace"
                            },
                            "bookGenres": [
                                { "genre": { "name": "Science Fiction" } },
                                { "genre": { "name": "Classics" } }
                            ],
                            "links({})": {
                                "secondaryAffiliateLinks": [
                                    { "url": "https://www.amazon.com/gp/product/B00B7NPRY8?tag=x-20" }
                                ]
                            }
                        }
                    }
                }
            }
        });
        format!(
            r#"<html><head><script id="__NEXT_DATA__" type="application/json">{}</script></head><body></body></html>"#,
            data
        )
    }

    fn search_page(href: &str) -> String {
        format!(
            r#"<html><body><table>
<tr itemscope itemtype="http://schema.org/Book">
  <td><a class="bookTitle" href="{}"><span>Dune</span></a></td>
</tr>
<tr itemscope itemtype="http://schema.org/Book">
  <td><a class="bookTitle" href="/book/show/999-other"><span>Other</span></a></td>
</tr>
</table></body></html>"#,
            href
        )
    }

    fn scrape_config(server: &MockServer) -> ScrapeConfig {
        ScrapeConfig {
            base_url: server.uri(),
            requests_per_second: 100,
            ..Default::default()
        }
    }

    #[test]
    fn test_search_query_normalization() {
        assert_eq!(
            search_query("The Left Hand of Darkness", Some("Ursula K. Le Guin")),
            "the+left+hand+of+darkness+ursula+k.+le+guin"
        );
        assert_eq!(search_query("Dune", None), "dune");
        assert_eq!(search_query("Cats & Dogs", None), "cats+%26+dogs");
    }

    #[test]
    fn test_first_result_link() {
        let base = Url::parse("https://www.goodreads.com").unwrap();
        let link = first_result_link(&search_page("/book/show/234225.Dune"), &base).unwrap();
        assert_eq!(link.as_str(), "https://www.goodreads.com/book/show/234225.Dune");
        assert!(first_result_link("<html><body>No results</body></html>", &base).is_none());
    }

    #[test]
    fn test_parse_detail_html() {
        let html = detail_page("234225", "Dune", Some("0441013597"));
        let book = parse_detail_html("https://example.test/book/show/234225", &html).unwrap();

        assert_eq!(book.goodreads_id.as_deref(), Some("234225"));
        assert_eq!(book.title, "Dune");
        assert_eq!(book.author.as_deref(), Some("Frank Herbert"));
        assert_eq!(book.isbn.as_deref(), Some("0441013597"));
        assert_eq!(book.isbn13.as_deref(), Some("9780441013593"));
        assert_eq!(book.asin, None);
        assert_eq!(book.date_published.as_deref(), Some("2016-03-19 02:14:25"));
        assert_eq!(book.publisher.as_deref(), Some("Ace"));
        assert_eq!(book.genres, vec!["science fiction", "classics"]);
        assert_eq!(book.amazon_id.as_deref(), Some("B00B7NPRY8"));
    }

    #[test]
    fn test_parse_detail_html_missing_block() {
        let err = parse_detail_html("https://example.test/x", "<html></html>").unwrap_err();
        match err {
            Error::Scrape { url, .. } => assert_eq!(url, "https://example.test/x"),
            other => panic!("expected scrape error, got {other:?}"),
        }

        let html = r#"<script id="__NEXT_DATA__">{"props":{"pageProps":{"apolloState":{}}}}</script>"#;
        assert!(matches!(
            parse_detail_html("https://example.test/x", html),
            Err(Error::Scrape { .. })
        ));

        let html = r#"<script id="__NEXT_DATA__">{not json</script>"#;
        assert!(matches!(
            parse_detail_html("https://example.test/x", html),
            Err(Error::Scrape { .. })
        ));
    }

    #[tokio::test]
    async fn test_by_title_author_follows_first_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "dune frank herbert"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(search_page("/book/show/234225.Dune")),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/book/show/234225.Dune"))
            .respond_with(ResponseTemplate::new(200).set_body_string(detail_page(
                "234225",
                "Dune",
                Some("0441013597"),
            )))
            .expect(1)
            .mount(&server)
            .await;

        let scraper = Scraper::new(&scrape_config(&server)).unwrap();
        let book = scraper
            .by_title_author("Dune", Some("Frank Herbert"))
            .await
            .unwrap();
        assert_eq!(book.isbn.as_deref(), Some("0441013597"));
        assert!(book.url.ends_with("/book/show/234225.Dune"));
    }

    #[tokio::test]
    async fn test_by_identifier_accepts_direct_detail_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "0441013597"))
            .respond_with(ResponseTemplate::new(200).set_body_string(detail_page(
                "234225",
                "Dune",
                Some("0441013597"),
            )))
            .mount(&server)
            .await;

        let scraper = Scraper::new(&scrape_config(&server)).unwrap();
        let book = scraper.by_identifier("0441013597").await.unwrap();
        assert_eq!(book.title, "Dune");
    }

    #[tokio::test]
    async fn test_empty_search_is_scrape_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body></body></html>"))
            .mount(&server)
            .await;

        let scraper = Scraper::new(&scrape_config(&server)).unwrap();
        let err = scraper.by_title_author("Nothing", None).await.unwrap_err();
        assert!(matches!(err, Error::Scrape { .. }));
    }

    #[tokio::test]
    async fn test_http_failure_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let scraper = Scraper::new(&scrape_config(&server)).unwrap();
        let err = scraper.by_identifier("0441013597").await.unwrap_err();
        assert!(matches!(err, Error::Fetch { .. }));
    }
}
