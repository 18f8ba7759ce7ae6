pub mod sonnen;
