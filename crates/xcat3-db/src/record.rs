//! The object-layer (§4.2) `Entity` contract every typed record
//! implements by hand: its table name and DB id. Change tracking itself
//! (`changed_fields()`) comes from `#[derive(Record)]` (`xcat3-macros`)
//! on each struct.

pub trait Entity {
    /// SQL table name, used by the bulk insert/update helpers in
    /// `pool.rs`.
    fn table_name() -> &'static str;

    /// `None` before the record has been assigned a DB id (not yet
    /// inserted).
    fn id(&self) -> Option<u64>;

    fn set_id(&mut self, id: u64);
}
