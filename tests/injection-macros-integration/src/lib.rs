//! 派生宏的跨 crate 集成测试，测试位于 `tests/` 目录。
