pub mod app;
pub mod player_surface;
pub mod stream_list;
