use anyhow::{Context, Result};
use bookshelf_core::persist::{load_books, load_loans, read_books_input, save_books, save_loans, DataPaths};
use bookshelf_core::snippet::{excerpt, highlight_terms};
use bookshelf_core::{Book, BookId, CompareOp, Library, Recommendation};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing_subscriber::{fmt, EnvFilter};

/// Synopsis characters shown either side of a search hit.
const EXCERPT_RADIUS: usize = 40;

#[derive(Parser)]
#[command(name = "bookshelf")]
#[command(about = "Search, filter and get recommendations from a library catalog", long_about = None)]
struct Cli {
    /// Directory holding books.json and loans.json
    #[arg(long, global = true, env = "BOOKSHELF_DATA", default_value = "./data")]
    data: PathBuf,
    /// Print results as JSON
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import books from a JSON/JSONL file or a directory of them
    Import {
        #[arg(long)]
        input: PathBuf,
        /// Drop the current catalog first
        #[arg(long, default_value_t = false)]
        replace: bool,
    },
    /// Add a single book
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        author: String,
        #[arg(long)]
        year: i32,
        #[arg(long, default_value_t = 1)]
        copies: u32,
        #[arg(long, default_value = "")]
        synopsis: String,
        #[arg(long = "category")]
        categories: Vec<String>,
    },
    /// Delete a book
    Remove {
        #[arg(long)]
        book: BookId,
    },
    /// Case-sensitive keyword search over titles, authors and synopses
    Search { keyword: String },
    /// Boolean/field query, e.g. `"AI" AND author="Alice" AND year>=2020`
    Query { query: String },
    FilterYear {
        #[arg(long)]
        year: i32,
        /// One of = > < >= <=
        #[arg(long, default_value = "=")]
        op: CompareOp,
    },
    FilterCategory { category: String },
    /// Personal recommendations from loan history
    Recommend {
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = 5)]
        count: usize,
        #[arg(long, value_enum, default_value_t = Mode::Hybrid)]
        mode: Mode,
    },
    /// Books similar to a given book
    Similar {
        #[arg(long)]
        book: BookId,
        #[arg(long, default_value_t = 5)]
        count: usize,
    },
    /// Most borrowed books
    Popular {
        #[arg(long, default_value_t = 10)]
        count: usize,
    },
    /// Catalog and category counts
    Stats,
    Borrow {
        #[arg(long)]
        user: String,
        #[arg(long)]
        book: BookId,
    },
    Return {
        #[arg(long)]
        user: String,
        #[arg(long)]
        book: BookId,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    Hybrid,
    Collaborative,
}

#[derive(Serialize)]
struct BookHit<'a> {
    id: BookId,
    title: &'a str,
    author: &'a str,
    year: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<f64>,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    let paths = DataPaths::new(&cli.data);
    let mut library = open(&paths)?;
    let json = cli.json;

    match cli.command {
        Commands::Import { input, replace } => {
            let imported = read_books_input(&input)?;
            let count = imported.len();
            let mut books: Vec<Book> = if replace { Vec::new() } else { library.books().cloned().collect() };
            books.extend(imported.into_iter().map(|b| b.with_id(0)));
            library = Library::from_parts(books, library.loans().to_vec())?;
            save(&paths, &library)?;
            println!("imported {} books ({} in catalog)", count, library.len());
        }
        Commands::Add { title, author, year, copies, synopsis, categories } => {
            let mut book = Book::new(title, author, year, copies).with_synopsis(synopsis);
            for category in categories {
                book.add_category(category);
            }
            let id = library.add_book(book)?;
            save(&paths, &library)?;
            println!("added book {}", id);
        }
        Commands::Remove { book } => {
            let removed = library.delete_book(book)?;
            save(&paths, &library)?;
            println!("removed [{}] {}", removed.id, removed.title);
        }
        Commands::Search { keyword } => {
            let ids = library.search(&keyword);
            print_books(&library, &ids, json, &[keyword.as_str()])?;
            if !json {
                for book in ids.iter().filter_map(|id| library.book(*id)) {
                    if let Some(context) = excerpt(&book.synopsis, &[keyword.as_str()], EXCERPT_RADIUS) {
                        println!("  [{}] {}", book.id, context);
                    }
                }
            }
        }
        Commands::Query { query } => {
            let ids = library
                .try_advanced_search(&query)
                .context("could not parse query; example: \"AI\" AND author=\"Alice\" AND year>=2020")?;
            if ids.is_empty() && !json {
                println!("no matches");
                if looks_structured(&query) {
                    println!("hint: field names are title, author, year, category, ...; quote values with spaces");
                }
            }
            print_books(&library, &ids, json, &[])?;
        }
        Commands::FilterYear { year, op } => {
            print_books(&library, &library.filter_by_year(year, op), json, &[])?;
        }
        Commands::FilterCategory { category } => {
            print_books(&library, &library.filter_by_category(&category), json, &[])?;
        }
        Commands::Recommend { user, count, mode } => {
            if !library.has_history(&user) {
                tracing::info!(user = %user, "no loan history, falling back to popular books");
                let ids: Vec<BookId> = library.popular_books(count).into_iter().map(|(id, _)| id).collect();
                print_books(&library, &ids, json, &[])?;
            } else {
                let recs = match mode {
                    Mode::Hybrid => library.hybrid_recommendations(&user, count),
                    Mode::Collaborative => library.collaborative_recommendations(&user, count),
                };
                print_recommendations(&library, &recs, json)?;
            }
        }
        Commands::Similar { book, count } => {
            if library.book(book).is_none() {
                anyhow::bail!("no book with id {}", book);
            }
            print_recommendations(&library, &library.content_recommendations(book, count), json)?;
        }
        Commands::Popular { count } => {
            for (id, loans) in library.popular_books(count) {
                if let Some(book) = library.book(id) {
                    println!("[{}] {} ({} loans)", id, book.title, loans);
                }
            }
        }
        Commands::Stats => {
            let stats = library.category_stats();
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("books: {}", library.len());
                println!("loans: {}", library.loans().len());
                for (category, count) in stats {
                    println!("  {}: {}", category, count);
                }
            }
        }
        Commands::Borrow { user, book } => {
            let now = OffsetDateTime::now_utc().unix_timestamp();
            library.borrow(&user, book, now)?;
            save(&paths, &library)?;
            let due = library.loans().last().map(|l| l.due_at).unwrap_or(now);
            println!("{} borrowed book {}, due {}", user, book, format_date(due)?);
        }
        Commands::Return { user, book } => {
            let now = OffsetDateTime::now_utc().unix_timestamp();
            library.return_book(&user, book, now)?;
            save(&paths, &library)?;
            println!("{} returned book {}", user, book);
        }
    }
    Ok(())
}

fn open(paths: &DataPaths) -> Result<Library> {
    let books = load_books(&paths.books())?;
    let loans = load_loans(&paths.loans())?;
    let library = Library::from_parts(books, loans)
        .with_context(|| format!("loading catalog from {}", paths.root.display()))?;
    tracing::debug!(books = library.len(), loans = library.loans().len(), "catalog loaded");
    Ok(library)
}

fn save(paths: &DataPaths, library: &Library) -> Result<()> {
    let books: Vec<Book> = library.books().cloned().collect();
    save_books(&paths.books(), &books)?;
    save_loans(&paths.loans(), library.loans())?;
    Ok(())
}

/// Boolean keywords or field operators suggest the user meant a structured
/// query rather than a plain title term.
fn looks_structured(query: &str) -> bool {
    let upper = query.to_uppercase();
    ["AND", "OR", "NOT"].iter().any(|kw| upper.split_whitespace().any(|w| w == *kw))
        || query.contains(['=', '~', '>', '<'])
}

fn format_date(ts: i64) -> Result<String> {
    let format = format_description!("[year]-[month]-[day]");
    Ok(OffsetDateTime::from_unix_timestamp(ts)?.format(&format)?)
}

fn print_books(library: &Library, ids: &[BookId], json: bool, highlight: &[&str]) -> Result<()> {
    let hits: Vec<BookHit> = ids
        .iter()
        .filter_map(|id| library.book(*id))
        .map(|b| BookHit { id: b.id, title: &b.title, author: &b.author, year: b.year, score: None })
        .collect();
    emit(&hits, json, highlight)
}

fn print_recommendations(library: &Library, recs: &[Recommendation], json: bool) -> Result<()> {
    let hits: Vec<BookHit> = recs
        .iter()
        .filter_map(|r| library.book(r.book_id).map(|b| (b, r.score)))
        .map(|(b, score)| BookHit { id: b.id, title: &b.title, author: &b.author, year: b.year, score: Some(score) })
        .collect();
    emit(&hits, json, &[])
}

fn emit(hits: &[BookHit], json: bool, highlight: &[&str]) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(hits)?);
        return Ok(());
    }
    for hit in hits {
        let title = if highlight.is_empty() { hit.title.to_string() } else { highlight_terms(hit.title, highlight) };
        match hit.score {
            Some(score) => println!("[{}] {} / {} ({}) score={:.4}", hit.id, title, hit.author, hit.year, score),
            None => println!("[{}] {} / {} ({})", hit.id, title, hit.author, hit.year),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("bookshelf").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn parses_filter_operators() {
        let parsed = cli(&["filter-year", "--year", "2020", "--op", ">="]);
        assert!(matches!(parsed.command, Commands::FilterYear { year: 2020, op: CompareOp::Ge }));
        assert!(Cli::try_parse_from(["bookshelf", "filter-year", "--year", "2020", "--op", "=>"]).is_err());
    }

    #[test]
    fn recommend_defaults_to_hybrid() {
        let parsed = cli(&["--data", "/tmp/x", "recommend", "--user", "amy"]);
        assert_eq!(parsed.data, PathBuf::from("/tmp/x"));
        assert!(matches!(parsed.command, Commands::Recommend { count: 5, mode: Mode::Hybrid, .. }));
    }

    #[test]
    fn structured_query_detection() {
        assert!(looks_structured("ai and ml"));
        assert!(looks_structured("year>=2020"));
        assert!(!looks_structured("android"));
    }

    #[test]
    fn malformed_query_is_an_error() {
        let dir = tempdir().unwrap();
        let data = dir.path().to_str().unwrap();
        let err = run(cli(&["--data", data, "query", "author=\""])).unwrap_err();
        assert!(err.to_string().starts_with("could not parse query"));
        assert!(err.root_cause().to_string().contains("unterminated"));
        assert!(run(cli(&["--data", data, "query", "year>=2020"])).is_ok());
    }

    #[test]
    fn import_then_borrow_persists_both_files() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("books.jsonl");
        fs::write(&input, "{\"title\":\"Dune\",\"author\":\"Frank Herbert\",\"totalCopies\":1,\"availableCopies\":1}\n").unwrap();
        let data = dir.path().join("data");
        let data_arg = data.to_str().unwrap();

        run(cli(&["--data", data_arg, "import", "--input", input.to_str().unwrap()])).unwrap();
        run(cli(&["--data", data_arg, "borrow", "--user", "amy", "--book", "1"])).unwrap();

        let paths = DataPaths::new(&data);
        assert_eq!(load_books(&paths.books()).unwrap()[0].available_copies, 0);
        assert_eq!(load_loans(&paths.loans()).unwrap()[0].username, "amy");
        assert!(run(cli(&["--data", data_arg, "borrow", "--user", "bob", "--book", "1"])).is_err());
    }
}
