use std::io::BufRead;

/// The three object kinds the store knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Blob,
    Tree,
    Commit,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Blob => "blob",
            ObjectType::Tree => "tree",
            ObjectType::Commit => "commit",
        }
    }

    /// Type code used in packfile object headers
    pub fn pack_code(&self) -> u8 {
        match self {
            ObjectType::Commit => 0b001,
            ObjectType::Tree => 0b010,
            ObjectType::Blob => 0b011,
        }
    }

    pub fn from_pack_code(code: u8) -> anyhow::Result<Self> {
        match code {
            0b001 => Ok(ObjectType::Commit),
            0b010 => Ok(ObjectType::Tree),
            0b011 => Ok(ObjectType::Blob),
            // 4 is tag, 6 and 7 are deltas; none of them are produced here
            other => Err(anyhow::anyhow!("Unsupported pack object type {other}")),
        }
    }

    /// Parse a `<kind> <size>\0` header, returning the kind and declared size
    pub fn parse_object_header(data_reader: &mut impl BufRead) -> anyhow::Result<(Self, usize)> {
        let mut object_type = Vec::new();
        data_reader.read_until(b' ', &mut object_type)?;
        if object_type.pop() != Some(b' ') {
            return Err(anyhow::anyhow!("Missing object type terminator"));
        }

        let object_type = ObjectType::try_from(std::str::from_utf8(&object_type)?)?;

        let mut size = Vec::new();
        data_reader.read_until(b'\0', &mut size)?;
        if size.pop() != Some(b'\0') {
            return Err(anyhow::anyhow!("Missing object size terminator"));
        }
        let size = std::str::from_utf8(&size)?.parse::<usize>()?;

        Ok((object_type, size))
    }

    pub fn header(&self, size: usize) -> String {
        format!("{} {}\0", self.as_str(), size)
    }
}

impl TryFrom<&str> for ObjectType {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> anyhow::Result<Self> {
        match value {
            "blob" => Ok(ObjectType::Blob),
            "tree" => Ok(ObjectType::Tree),
            "commit" => Ok(ObjectType::Commit),
            _ => Err(anyhow::anyhow!("Invalid object type {value}")),
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Cursor;

    #[rstest]
    #[case(ObjectType::Commit, 1)]
    #[case(ObjectType::Tree, 2)]
    #[case(ObjectType::Blob, 3)]
    fn pack_codes_match_git(#[case] kind: ObjectType, #[case] code: u8) {
        assert_eq!(kind.pack_code(), code);
        assert_eq!(ObjectType::from_pack_code(code).unwrap(), kind);
    }

    #[test]
    fn header_is_parsed_with_size() {
        let mut reader = Cursor::new(b"blob 11\0hello world".to_vec());
        let (kind, size) = ObjectType::parse_object_header(&mut reader).unwrap();

        assert_eq!(kind, ObjectType::Blob);
        assert_eq!(size, 11);
        assert_eq!(reader.position(), 8);
    }

    #[test]
    fn truncated_header_is_rejected() {
        let mut reader = Cursor::new(b"blob 11".to_vec());
        assert!(ObjectType::parse_object_header(&mut reader).is_err());
    }
}
