//! Book commands: listing, lookup, status changes and edits

use crate::catalog::{
    ActivityEntry, Book, BookEvent, BookUpdate, Catalog, ListOptions, OwnedStatus, Page,
    ReadStatus, StatusChange, StatusFilter,
};
use crate::dates::display_date;
use crate::error::{Error, Result};
use crate::scrape::BookLookup;
use serde::{Deserialize, Serialize};
use tracing::info;

/// A book together with its event history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookDetail {
    pub book: Book,
    pub events: Vec<BookEvent>,
}

pub async fn cmd_list_books(catalog: &Catalog, options: &ListOptions) -> Result<Vec<Book>> {
    catalog.list_all(options).await
}

pub async fn cmd_search(catalog: &Catalog, query: &str) -> Result<Vec<Book>> {
    catalog.search(query).await
}

/// Load a book and its events, newest first
pub async fn cmd_show(catalog: &Catalog, book_id: i64) -> Result<BookDetail> {
    let book = catalog
        .get_by_id(book_id)
        .await?
        .ok_or(Error::BookNotFound(book_id))?;
    let events = catalog.events_for_book(book_id).await?;
    Ok(BookDetail { book, events })
}

/// Record an explicit read or owned status change
pub async fn cmd_mark(catalog: &Catalog, book_id: i64, change: StatusChange) -> Result<Book> {
    info!("Recording status change for book {}", book_id);
    catalog.record_status_change(book_id, change).await
}

pub async fn cmd_edit(catalog: &Catalog, book_id: i64, update: &BookUpdate) -> Result<Book> {
    info!("Editing book {}", book_id);
    catalog.update_book(book_id, update).await
}

/// Scrape a book by ISBN (or other identifier) and add it to the catalog
pub async fn cmd_add(
    catalog: &Catalog,
    lookup: &dyn BookLookup,
    identifier: &str,
    read: ReadStatus,
    owned: OwnedStatus,
) -> Result<Book> {
    let identifier = identifier.trim();
    if identifier.is_empty() {
        return Err(Error::Validation("an identifier is required".to_string()));
    }

    info!("Looking up {}", identifier);
    let scraped = lookup.by_identifier(identifier).await?;
    let book = catalog.create_from_scrape(read, owned, &scraped).await?;
    info!("Added book {} ({})", book.id, book.title);
    Ok(book)
}

pub async fn cmd_activity(
    catalog: &Catalog,
    filter: StatusFilter,
    page: Page,
) -> Result<Vec<ActivityEntry>> {
    catalog.recent_events(filter, page).await
}

fn shown_date(date: Option<&str>) -> String {
    match date {
        Some(d) => display_date(d).unwrap_or_else(|_| d.to_string()),
        None => "-".to_string(),
    }
}

fn print_book_line(book: &Book) {
    println!(
        "• [{}] {}{}",
        book.id,
        book.title,
        book.author
            .as_deref()
            .map(|a| format!(" by {}", a))
            .unwrap_or_default()
    );
    println!(
        "  {} / {}  (last read event: {})",
        book.status_read,
        book.status_owned,
        shown_date(book.date_last_read_event.as_deref())
    );
}

/// Print a list of books to console
pub fn print_books(books: &[Book]) {
    if books.is_empty() {
        println!("No books found.");
        return;
    }

    println!("\n📚 Books\n");
    for book in books {
        print_book_line(book);
    }
    println!("\n{} book(s)", books.len());
}

/// Print one book with its history to console
pub fn print_book_detail(detail: &BookDetail) {
    let book = &detail.book;
    println!("\n📖 {}\n", book.title);
    if let Some(author) = &book.author {
        println!("Author: {}", author);
    }
    println!("Read: {}", book.status_read);
    println!("Owned: {}", book.status_owned);
    println!("Published: {}", shown_date(book.date_published.as_deref()));

    let identifiers = [
        ("ISBN", &book.isbn),
        ("ISBN-13", &book.isbn13),
        ("ASIN", &book.asin),
        ("Oku", &book.oku_id),
        ("Goodreads", &book.goodreads_id),
        ("Amazon", &book.amazon_id),
    ];
    for (label, value) in identifiers {
        if let Some(value) = value {
            println!("{}: {}", label, value);
        }
    }

    if let Some(description) = &book.description {
        println!("\n{}", description);
    }

    println!("\nHistory:");
    if detail.events.is_empty() {
        println!("  (no events)");
    }
    for event in &detail.events {
        println!(
            "  {}  {}",
            shown_date(Some(&event.date_created)),
            event.event_type
        );
    }
}

/// Print recent activity to console
pub fn print_activity(entries: &[ActivityEntry]) {
    if entries.is_empty() {
        println!("No activity yet.");
        return;
    }

    println!("\n🕑 Recent Activity\n");
    for entry in entries {
        println!(
            "{}  {:<14} {}",
            shown_date(Some(&entry.event.date_created)),
            entry.event.event_type,
            entry.book.title
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::{feed_book, setup_test_db};
    use crate::jobs::tests::FakeLookup;

    #[tokio::test]
    async fn test_show_returns_events_and_missing_book_errors() {
        let (catalog, _tmp) = setup_test_db().await;
        catalog
            .upsert_books_from_feed(&[feed_book("a", "Alpha")])
            .await
            .unwrap();
        let book = catalog.search("Alpha").await.unwrap().remove(0);
        cmd_mark(&catalog, book.id, StatusChange::read(ReadStatus::Reading))
            .await
            .unwrap();

        let detail = cmd_show(&catalog, book.id).await.unwrap();
        assert_eq!(detail.book.status_read, ReadStatus::Reading);
        assert_eq!(detail.events.len(), 1);

        assert!(matches!(
            cmd_show(&catalog, 9999).await,
            Err(Error::BookNotFound(9999))
        ));
    }

    #[tokio::test]
    async fn test_add_creates_book_from_lookup() {
        let (catalog, _tmp) = setup_test_db().await;
        let lookup = FakeLookup::new(&[("Dune", Some("0441013597"))]);

        let book = cmd_add(
            &catalog,
            &lookup,
            " 0441013597 ",
            ReadStatus::NotRead,
            OwnedStatus::Wanted,
        )
        .await
        .unwrap();
        assert_eq!(book.title, "Dune");
        assert_eq!(book.status_owned, OwnedStatus::Wanted);
        assert_eq!(book.isbn.as_deref(), Some("0441013597"));

        let again = cmd_add(
            &catalog,
            &lookup,
            "0441013597",
            ReadStatus::NotRead,
            OwnedStatus::Wanted,
        )
        .await;
        assert!(matches!(again, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_add_rejects_blank_identifier() {
        let (catalog, _tmp) = setup_test_db().await;
        let lookup = FakeLookup::new(&[]);
        let result = cmd_add(&catalog, &lookup, "  ", ReadStatus::Read, OwnedStatus::Owned).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
