//! Sample inventory ledger service.
//!
//! A single `.xlsx` workbook acts as the table of record. Columns are found by
//! their localized header text, extra sample items are packed into the
//! primary remark cell, and printable label codes are expanded from each
//! sample number.

pub mod config;
pub mod db;
pub mod error;
pub mod inventory;
pub mod settings;
pub mod web;
