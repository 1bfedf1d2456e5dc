/// Data layer: source parsing, the on-disk store, and ingestion.
///
/// Architecture:
/// ```text
///  encoded_games.csv
///        │
///        ▼
///   ┌──────────┐
///   │  split    │  group rows by game_id → one CSV per game
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  source   │  capped, typed rows → Sample
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  builder  │  batch samples, one segment per file, per-file failures
///   └──────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │ store/manifest│  Parquet segments + manifest.json (widen, append, read)
///   └──────────────┘
/// ```

pub mod builder;
pub mod manifest;
pub mod model;
pub mod source;
pub mod split;
pub mod store;
