use di_abstractions::InjectionSchema;
use infrastructure_common::Injectable as _;
use injection_macros::Injectable;

#[derive(Injectable)]
pub struct Marker;

fn main() {
    assert!(Marker::injection_declarations().is_empty());
    let mut marker = Marker;
    assert!(marker.set_property("anything", None).is_err());
}
