//! Root package of the workspace. It holds no code of its own; the
//! cross-crate tests under `tests/` drive the `simulator`, `persistence` and
//! `timetable` crates together.
