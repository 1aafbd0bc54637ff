use crate::models::ResolvedRecord;

/// Decides whether a record is complete enough to stop walking providers.
///
/// Checked after every provider that contributed data. Closures of the form
/// `Fn(&ResolvedRecord) -> bool` implement this trait.
pub trait Completeness: Send + Sync {
    fn is_complete(&self, record: &ResolvedRecord) -> bool;
}

impl<F> Completeness for F
where
    F: Fn(&ResolvedRecord) -> bool + Send + Sync,
{
    fn is_complete(&self, record: &ResolvedRecord) -> bool {
        self(record)
    }
}

/// Complete once every named field is populated.
#[derive(Clone, Debug)]
pub struct RequiredFields(Vec<String>);

impl RequiredFields {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(fields.into_iter().map(Into::into).collect())
    }

    pub fn fields(&self) -> &[String] {
        &self.0
    }
}

impl Completeness for RequiredFields {
    fn is_complete(&self, record: &ResolvedRecord) -> bool {
        self.0.iter().all(|f| record.field(f).is_some())
    }
}

/// Complete once the record holds at least one list item.
#[derive(Clone, Copy, Debug, Default)]
pub struct NonEmptyItems;

impl Completeness for NonEmptyItems {
    fn is_complete(&self, record: &ResolvedRecord) -> bool {
        !record.items().is_empty()
    }
}

/// Never complete: every eligible provider is consulted.
#[derive(Clone, Copy, Debug, Default)]
pub struct WalkAll;

impl Completeness for WalkAll {
    fn is_complete(&self, _record: &ResolvedRecord) -> bool {
        false
    }
}
