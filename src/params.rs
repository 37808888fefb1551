use crate::Value;

/// Named SQL parameters bound to `:name` placeholders.
///
/// The Data API only supports named parameters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params(pub(crate) Vec<(String, Value)>);

impl Params {
    /// Builds named parameters.
    ///
    /// Names can be provided with or without the `:` prefix.
    pub fn named<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Self::default()
    }
}

impl From<Vec<(String, Value)>> for Params {
    fn from(values: Vec<(String, Value)>) -> Self {
        Self(values)
    }
}

impl<K: Into<String>, const N: usize> From<[(K, Value); N]> for Params {
    fn from(values: [(K, Value); N]) -> Self {
        Self::named(values)
    }
}
