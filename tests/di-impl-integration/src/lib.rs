//! 容器与服务提供者注册表的跨 crate 集成测试，测试位于 `tests/` 目录。
