//! Write Path
//!
//! This module provides the [`BucketWriter`], which routes each incoming sample
//! into its device's open bucket.
//!
//! # Architecture
//!
//! The writer validates the sample and hands it to the store's atomic append
//! primitive. It keeps no bucket state between calls; the store decides which
//! bucket takes the sample and whether a new one has to be created.
//!
//! # Example
//!
//! ```ignore
//! let writer = BucketWriter::new(Arc::clone(&store))?;
//! let bucket_ref = writer.write("pump-7", Sample::new("pump-7", ts).with_metric("rpm", 900))?;
//! ```

pub mod bucket_writer;

pub use bucket_writer::BucketWriter;
