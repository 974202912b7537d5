// src/storage/title.rs

//! Title identifiers and the store keys derived from them

use super::ContentIndex;

/// 64-bit identifier of the running package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TitleId(pub u64);

impl TitleId {
    /// Upper 32 bits (the title type)
    pub fn hi(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Lower 32 bits (the title's own id)
    pub fn lo(&self) -> u32 {
        self.0 as u32
    }

    /// Root of this title's namespace in the store: `/title/<hi>/<lo>`
    pub fn root_key(&self) -> String {
        format!("/title/{:08x}/{:08x}", self.hi(), self.lo())
    }

    /// Key of an object under this title, e.g. `data/state.txt`
    pub fn key(&self, relative: &str) -> String {
        format!("{}/{}", self.root_key(), relative.trim_start_matches('/'))
    }

    /// Key of the installed object backing a content slot
    pub fn content_key(&self, index: ContentIndex) -> String {
        self.key(&format!("content/{:08x}.app", index))
    }
}

impl std::fmt::Display for TitleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x}-{:08x}", self.hi(), self.lo())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_halves() {
        let id = TitleId(0x0001_0001_4f53_4341);
        assert_eq!(id.hi(), 0x0001_0001);
        assert_eq!(id.lo(), 0x4f53_4341);
    }

    #[test]
    fn test_keys() {
        let id = TitleId(0x0001_0001_4f53_4341);
        assert_eq!(id.root_key(), "/title/00010001/4f534341");
        assert_eq!(id.key("data/state.txt"), "/title/00010001/4f534341/data/state.txt");
        assert_eq!(id.key("/data/state.txt"), "/title/00010001/4f534341/data/state.txt");
        assert_eq!(id.content_key(3), "/title/00010001/4f534341/content/00000003.app");
        assert_eq!(id.content_key(0x1a), "/title/00010001/4f534341/content/0000001a.app");
    }

    #[test]
    fn test_display() {
        assert_eq!(TitleId(0x0001_0001_0000_00ff).to_string(), "00010001-000000ff");
    }
}
