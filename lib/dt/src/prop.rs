use alloc::{boxed::Box, vec::Vec};
use core::str;

/// A named property attached to a device node.
///
/// Values use the flattened device-tree encoding: cells are big-endian `u32`s,
/// strings are NUL-terminated and string lists are concatenated NUL-terminated strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: Box<str>,
    pub data: Box<[u8]>,
}

impl Property {
    pub fn new(name: impl AsRef<str>, data: impl Into<Box<[u8]>>) -> Property {
        Property {
            name: Box::from(name.as_ref()),
            data: data.into(),
        }
    }

    /// Property without a value, e.g. `dma-coherent`.
    pub fn flag(name: impl AsRef<str>) -> Property {
        Property::new(name, Vec::<u8>::new())
    }

    pub fn from_u32(name: impl AsRef<str>, value: u32) -> Property {
        Property::new(name, value.to_be_bytes().to_vec())
    }

    pub fn from_cells(name: impl AsRef<str>, cells: &[u32]) -> Property {
        let data: Vec<u8> = cells.iter().flat_map(|x| x.to_be_bytes()).collect();
        Property::new(name, data)
    }

    pub fn from_string(name: impl AsRef<str>, value: &str) -> Property {
        let mut data = Vec::with_capacity(value.len() + 1);
        data.extend_from_slice(value.as_bytes());
        data.push(0);
        Property::new(name, data)
    }

    pub fn from_strlist(name: impl AsRef<str>, values: &[&str]) -> Property {
        let mut data = Vec::new();
        for value in values {
            data.extend_from_slice(value.as_bytes());
            data.push(0);
        }
        Property::new(name, data)
    }
}

impl Property {
    pub fn value_as_u32(&self) -> Result<u32, PropertyError> {
        let cell: [u8; 4] = self
            .data
            .get(..4)
            .ok_or(PropertyError::InvalidPropFormat)?
            .try_into()
            .map_err(|_| PropertyError::InvalidPropFormat)?;
        Ok(u32::from_be_bytes(cell))
    }
    pub fn value_as_cells(&self) -> Result<Vec<u32>, PropertyError> {
        if self.data.len() % 4 != 0 {
            return Err(PropertyError::InvalidPropFormat);
        }
        Ok(self
            .data
            .chunks_exact(4)
            .map(|x| u32::from_be_bytes([x[0], x[1], x[2], x[3]]))
            .collect())
    }
    pub fn value_as_str(&self) -> Result<&str, PropertyError> {
        str::from_utf8(&self.data)
            .map(|x| x.trim_end_matches('\0'))
            .map_err(|_| PropertyError::InvalidPropFormat)
    }
    pub fn value_as_strlist(&self) -> Result<Vec<&str>, PropertyError> {
        let mut res = Vec::new();
        for part in self.data.split(|x| *x == 0) {
            if part.is_empty() {
                continue;
            }
            res.push(str::from_utf8(part).map_err(|_| PropertyError::InvalidPropFormat)?);
        }
        Ok(res)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyError {
    InvalidPropFormat,
    PropNotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u32_is_big_endian() {
        let prop = Property::from_u32("num-cs", 4);
        assert_eq!(&*prop.data, &[0, 0, 0, 4]);
        assert_eq!(prop.value_as_u32(), Ok(4));
    }

    #[test]
    fn short_u32_is_rejected() {
        let prop = Property::new("num-cs", vec![1u8, 2]);
        assert_eq!(prop.value_as_u32(), Err(PropertyError::InvalidPropFormat));
    }

    #[test]
    fn strlist_splits_on_nul() {
        let prop = Property::from_strlist("compatible", &["packt,iio-dummy-random", "iio"]);
        assert_eq!(
            prop.value_as_strlist().unwrap(),
            vec!["packt,iio-dummy-random", "iio"]
        );
        assert_eq!(
            Property::from_string("status", "okay").value_as_str(),
            Ok("okay")
        );
    }

    #[test]
    fn cells_require_whole_words() {
        assert_eq!(
            Property::from_cells("reg", &[0x1000, 0x100]).value_as_cells(),
            Ok(vec![0x1000, 0x100])
        );
        assert!(Property::new("reg", vec![0u8; 5]).value_as_cells().is_err());
    }
}
