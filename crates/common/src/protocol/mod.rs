// Wire formats shared by the daemon and its clients.

pub mod events;
pub mod terminal;
