use bookshelf_core::persist::{load_books, load_loans, read_books_input, save_books, save_loans, DataPaths};
use bookshelf_core::{Book, Loan};
use std::fs;
use tempfile::tempdir;

#[test]
fn missing_files_load_empty() {
    let dir = tempdir().unwrap();
    let paths = DataPaths::new(dir.path());
    assert!(load_books(&paths.books()).unwrap().is_empty());
    assert!(load_loans(&paths.loans()).unwrap().is_empty());
}

#[test]
fn catalog_files_survive_a_save() {
    let dir = tempdir().unwrap();
    let paths = DataPaths::new(dir.path().join("data"));
    let books = vec![Book::new("Dune", "Frank Herbert", 1965, 2).with_id(1).with_category("SF")];
    let mut loan = Loan::new("amy", 1, 100);
    loan.returned_at = Some(200);
    save_books(&paths.books(), &books).unwrap();
    save_loans(&paths.loans(), &[loan.clone()]).unwrap();

    assert_eq!(load_books(&paths.books()).unwrap(), books);
    assert_eq!(load_loans(&paths.loans()).unwrap(), vec![loan]);
    let raw = fs::read_to_string(paths.books()).unwrap();
    assert!(raw.contains("\"totalCopies\": 2"));
}

#[test]
fn loan_files_accept_wrapped_and_bare_shapes() {
    let dir = tempdir().unwrap();
    let wrapped = dir.path().join("wrapped.json");
    fs::write(
        &wrapped,
        r#"{"finePolicy":{"graceDays":2},"loans":[{"username":"amy","bookId":1,"borrowDate":5,"dueDate":9,"returnDate":7}]}"#,
    )
    .unwrap();
    let bare = dir.path().join("bare.json");
    fs::write(&bare, r#"[{"username":"bob","bookId":2,"borrowDate":5}]"#).unwrap();

    let loans = load_loans(&wrapped).unwrap();
    assert_eq!(loans[0].returned_at, Some(7));
    assert_eq!(load_loans(&bare).unwrap()[0].username, "bob");
}

#[test]
fn import_reads_json_jsonl_and_directories() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.json"), r#"[{"title":"A","author":"x"},{"title":"B","author":"y"}]"#).unwrap();
    fs::write(dir.path().join("b.jsonl"), "{\"title\":\"C\",\"author\":\"z\",\"year\":2001}\n\n").unwrap();
    fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let books = read_books_input(dir.path()).unwrap();
    let titles: Vec<&str> = books.iter().map(|b| b.title.as_str()).collect();
    assert_eq!(titles, vec!["A", "B", "C"]);
    assert_eq!(books[2].year, 2001);

    assert!(read_books_input(&dir.path().join("missing")).is_err());
}
