use crate::types::VertexId;

/// Read-only visitor used to pull one result per vertex after a run.
pub trait VertexQuery<V>: Sync {
    type Output: Send;

    fn query(&self, id: VertexId, state: &V) -> Self::Output;
}

impl<V, T, F> VertexQuery<V> for F
where
    T: Send,
    F: Fn(VertexId, &V) -> T + Sync,
{
    type Output = T;

    fn query(&self, id: VertexId, state: &V) -> T {
        self(id, state)
    }
}
