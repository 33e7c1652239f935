pub mod selection;
pub mod signals;

// Re-export commonly used types
pub use selection::{select, SelectedTicker, Selection, SelectionParams, TickerSelector, Track};
pub use signals::{detect_signals, Direction, MaWindow, Signal, SignalDetector, SignalRepository};
