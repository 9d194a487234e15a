use comfy_table::{ContentArrangement, Table};
use itertools::Itertools;

use crate::form::FieldErrors;
use crate::model::{Book, BookPage, LibrarySummary};

pub const TABLE_WIDTH: u16 = 120;

fn cover_label(cover: &Option<String>) -> String {
    match cover {
        // base64 inflates by 4/3
        Some(data) => format!("yes ({} KB)", data.len() * 3 / 4 / 1024),
        None => String::new(),
    }
}

fn or_blank<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

pub fn book_table(books: &[Book]) -> String {
    let mut table = Table::new();
    table.set_width(TABLE_WIDTH);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Id", "Title", "Author", "Publication Date", "ISBN", "Cover Image"]);
    for book in books {
        table.add_row(vec![
            book.id.to_string(),
            book.title.clone(),
            book.author.clone(),
            or_blank(&book.publication_date),
            or_blank(&book.isbn),
            cover_label(&book.cover_image),
        ]);
    }
    table.to_string()
}

pub fn render_page(page: &BookPage) -> String {
    if page.books.is_empty() {
        return "No books available.".to_owned();
    }
    let pagination = &page.pagination;
    format!(
        "{}\nPage {} of {} | Total {} items",
        book_table(&page.books),
        pagination.page,
        pagination.page_count().max(1),
        pagination.total
    )
}

pub fn render_book(book: &Book) -> String {
    let mut lines = vec![
        format!("Id:               {}", book.id),
        format!("Title:            {}", book.title),
        format!("Author:           {}", book.author),
        format!("Publication Date: {}", or_blank(&book.publication_date)),
        format!("ISBN:             {}", or_blank(&book.isbn)),
        format!("Cover Image:      {}", cover_label(&book.cover_image)),
    ];
    if let Some(created) = book.created_at {
        lines.push(format!("Created:          {}", created.format("%Y-%m-%d %H:%M")));
    }
    if let Some(updated) = book.updated_at {
        lines.push(format!("Updated:          {}", updated.format("%Y-%m-%d %H:%M")));
    }
    lines.join("\n")
}

pub fn render_summary(summary: &LibrarySummary) -> String {
    if summary.recent_additions.is_empty() {
        return format!("Total books: {}", summary.total_books);
    }
    format!(
        "Total books: {}\nRecent additions:\n{}",
        summary.total_books,
        book_table(&summary.recent_additions)
    )
}

pub fn render_field_errors(errors: &FieldErrors) -> String {
    errors
        .iter()
        .map(|(field, message)| format!("  {}: {}", field, message))
        .join("\n")
}
