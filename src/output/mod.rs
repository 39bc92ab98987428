use anyhow::Result;
use serde_json::json;
use std::path::Path;

use crate::cli::OutputFormat;
use crate::store::BlogArticle;

/// Render an article in the requested format
pub fn render(article: &BlogArticle, format: OutputFormat) -> Result<String> {
    let content = match format {
        OutputFormat::Markdown => format_as_markdown(article),
        OutputFormat::Json => format_as_json(article)?,
        OutputFormat::Text => article.content.clone(),
    };
    Ok(content)
}

fn format_as_markdown(article: &BlogArticle) -> String {
    format!(
        "# {}\n\n_Source: <{}>_\n\n{}\n",
        article.source_title, article.source_link, article.content
    )
}

fn format_as_json(article: &BlogArticle) -> Result<String> {
    let value = json!({
        "id": article.id,
        "title": article.source_title,
        "link": article.source_link,
        "content": article.content,
        "created_at": article.created_at,
    });
    Ok(serde_json::to_string_pretty(&value)?)
}

/// Save an article to file
pub async fn save_to_file(article: &BlogArticle, path: &Path, format: OutputFormat) -> Result<()> {
    let content = render(article, format)?;
    fs_err::write(path, content)?;
    Ok(())
}

/// Print an article to console
pub fn print_to_console(article: &BlogArticle, format: OutputFormat) -> Result<()> {
    println!("{}", render(article, format)?);
    Ok(())
}

/// One line per article for listings
pub fn summary_line(article: &BlogArticle) -> String {
    format!(
        "{}  {}  {}  ({})",
        article.created_at.format("%Y-%m-%d %H:%M"),
        article.id,
        article.source_title,
        article.source_link
    )
}
