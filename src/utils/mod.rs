pub mod o11y;
