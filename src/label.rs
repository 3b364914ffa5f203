use std::borrow::Cow;

/// Stable, human-readable name of a message variant.
///
/// The label is written into every envelope as `messageType` and read back by
/// the consumer to choose a decoder, so producers and consumers must agree on
/// it. Derive it with `#[derive(Label)]` to get the variant name.
pub trait Label {
    fn label(&self) -> Cow<'static, str>;
}
