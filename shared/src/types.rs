pub type Tick = u16;
pub type EntityId = u16;
pub type EntityVersion = u8;
pub type PlayerId = u8;
pub type ClassId = u16;
pub type RpcId = u16;
