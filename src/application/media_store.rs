use std::io;

/// Lookup of media files referenced from cards.
///
/// The validator only asks whether a file exists; the packager reads its bytes.
pub trait MediaStore {
    fn contains(&self, filename: &str) -> bool;

    fn read(&self, filename: &str) -> io::Result<Vec<u8>>;
}

impl<M: MediaStore + ?Sized> MediaStore for &M {
    fn contains(&self, filename: &str) -> bool {
        (**self).contains(filename)
    }

    fn read(&self, filename: &str) -> io::Result<Vec<u8>> {
        (**self).read(filename)
    }
}
