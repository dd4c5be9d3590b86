pub mod name;

pub use name::{
    is_track_file_name, normalize_new_name, starter_content, validate, validate_name,
    TrackNameError, TRACK_EXTENSION,
};
