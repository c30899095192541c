/// State carried through one graph execution.
///
/// Each implementation declares its own update type and merges updates
/// field-wise: an accumulating field (a message history) concatenates, a
/// working field (documents, question, generation) replaces with the latest
/// value, and a field omitted from an update is left unchanged — omission
/// never means "clear to default". Every run starts from `Default` unless a
/// checkpoint exists for the thread.
pub trait ChannelState: Clone + Default + Send + Sync + 'static {
    type Update: Send + 'static;

    fn apply(&mut self, update: Self::Update);
}
