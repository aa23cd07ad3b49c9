//! End-to-end scenarios run against the library's public API: panels, frame
//! composition, refresh scheduling and the console command path.

mod display_tests;
