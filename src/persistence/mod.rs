mod object;

pub use object::{load_object, load_object_as, save_object, save_object_as, ObjectFormat};
