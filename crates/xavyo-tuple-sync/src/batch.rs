use std::future::Future;

/// Apply `f` to each contiguous chunk of `items`, in order.
///
/// Stops at the first error and returns it. Chunks already handed to `f` are
/// not undone. Returns the number of chunks processed. A `size` of zero is
/// treated as one.
pub async fn for_each_batch<'a, T, F, Fut, E>(
    items: &'a [T],
    size: usize,
    mut f: F,
) -> Result<usize, E>
where
    F: FnMut(&'a [T]) -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    let mut batches = 0;
    for chunk in items.chunks(size.max(1)) {
        f(chunk).await?;
        batches += 1;
    }
    Ok(batches)
}
