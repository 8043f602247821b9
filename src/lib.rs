//! # Pixlift
//!
//! A batch image optimizer and uploader for static sites. Point it at a
//! content directory: every image gets resized into a set of profiles,
//! encoded as AVIF, pushed to a media host, and recorded in a local mapping
//! store that links each source file to its hosted variant URLs.
//!
//! # Architecture: One Pass, Durable State
//!
//! A run is a single pass over the content tree:
//!
//! ```text
//! 1. Discover   content/        →  sorted candidate list
//! 2. Reconcile  mapping.json    →  prune entries whose source is gone
//! 3. Process    each new image  →  analyze, N variants, N uploads
//! 4. Persist    mapping.json + processing-report.json
//! ```
//!
//! Everything the pipeline knows lives in two JSON files under the state
//! directory:
//!
//! - **`mapping.json`** — the source of truth. One entry per processed image
//!   keyed by basename, holding every hosted variant URL plus the source
//!   analysis. An image with an entry is skipped on the next run; deleting
//!   the entry (or the source file) schedules it for reprocessing.
//! - **`processing-report.json`** — what the last run did: counts, byte
//!   savings, warnings, per-image errors.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`discover`] | Walks the content tree, filters by extension, prunes hidden and excluded directories |
//! | [`imaging`] | Pure-Rust image operations: analysis, resize, AVIF encode, container measurement |
//! | [`upload`] | Media host client — multipart POST per variant, URL extraction |
//! | [`store`] | The `mapping.json` basename → hosted-variants store, with reconciliation |
//! | [`pipeline`] | The orchestrator: ties discovery, imaging, upload, and store together with per-image isolation |
//! | [`retry`] | Exponential-backoff retry policy wrapped around every analyze, transform, and upload call |
//! | [`events`] | Typed pipeline events and the sink trait observers implement |
//! | [`report`] | Run statistics and the persisted processing / cleanup reports |
//! | [`config`] | `pixlift.toml` loading, stock defaults, table-level merging, validation |
//! | [`output`] | Console formatting — event lines, summaries, the discover listing |
//!
//! # Design Decisions
//!
//! ## AVIF-Only Variants
//!
//! All generated variants are AVIF. The format has had [100% browser support
//! since September 2023](https://caniuse.com/avif) and produces dramatically
//! smaller files than JPEG at equivalent quality. A single modern output
//! format keeps the hosted set small and the store schema simple: no
//! per-format fallback bookkeeping.
//!
//! ## Pure-Rust Imaging (No ImageMagick, No FFmpeg)
//!
//! The [`imaging`] module uses the `image` crate (Lanczos3 resampling) and
//! `rav1e` (AVIF encoding) — both pure Rust. No system dependencies: no
//! `apt install`, no Homebrew, no version drift between machines. The binary
//! is fully self-contained, which matters for a tool meant to run the same
//! way on a laptop and in CI.
//!
//! ## Basename Identity
//!
//! Images are identified by file name alone, wherever they sit in the tree.
//! Moving `photo.jpg` between directories does not re-upload it; two files
//! with the same name in different directories are one image as far as the
//! store is concerned. This is a deliberate trade: content trees curated by
//! hand rarely reuse names, and basename identity survives the directory
//! reshuffles they do all the time.
//!
//! ## All-or-Nothing per Image
//!
//! An image either ends up in the store with every profile's variant hosted,
//! or it leaves no store entry at all. There is no partial record to merge on
//! the next run, and no remote rollback: variants uploaded before a later
//! failure stay on the host, unreferenced, and the whole image is retried
//! next time. The media host is treated as cheap append-only storage; local
//! state stays simple.
//!
//! ## Injected Event Sinks
//!
//! The pipeline never logs to a global logger. Every entry point takes an
//! [`events::EventSink`] and reports progress as typed values; the binary
//! plugs in a console sink, the tests a recording one. Severity filtering is
//! the sink's problem, so emission sites stay unconditional.

pub mod config;
pub mod discover;
pub mod events;
pub mod imaging;
pub mod output;
pub mod pipeline;
pub mod report;
pub mod retry;
pub mod store;
pub mod upload;
