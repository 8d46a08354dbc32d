use slotmap::new_key_type;

new_key_type! {
    /// Identifies a placed layout entity (belt, underground or splitter).
    pub struct SegmentId;

    /// Identifies a splitter node in the flow graph.
    pub struct SplitterId;

    /// Identifies a belt edge in the flow graph.
    pub struct BeltId;
}
