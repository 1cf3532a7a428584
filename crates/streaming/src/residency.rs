/// Lifecycle of one step image inside the cache.
///
/// Downloading → Resident, or Downloading → Failed. A failed entry goes back
/// to Downloading on the next request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResidencyState {
    Downloading,
    Resident,
    Failed,
}
