pub mod document;
pub mod language_model;
pub mod vector_repository;
