//! trybuild 编译期测试：派生宏的展开必须能在下游 crate 中编译

#[test]
fn trybuild_injection_macros() {
    let t = trybuild::TestCases::new();
    t.pass("tests/trybuild/derive_ok.rs");
    t.pass("tests/trybuild/derive_unit.rs");
}
