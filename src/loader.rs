//! Resolving offset tables into collections of resources.
//!
//! Resources implement [Loadable] to read themselves at the cursor's current position.
//! The functions here seek to an array, load each element, and restore the position afterwards
//! so resources can load their own children recursively.
use binread::BinRead;

use crate::dict::{DictNode, ResDict};
use crate::{ByteCursor, DecodeError};

#[cfg(feature = "derive_serde")]
use serde::{Deserialize, Serialize};

/// A resource that can be read from the cursor's current position.
pub trait Loadable: Sized {
    fn load(reader: &mut ByteCursor) -> Result<Self, DecodeError>;
}

/// An ordered collection of resources with names from a [ResDict].
#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ResMap<T> {
    pub dict: ResDict,
    values: Vec<T>,
    offsets: Vec<u64>,
}

impl<T> Default for ResMap<T> {
    fn default() -> Self {
        Self {
            dict: ResDict::default(),
            values: Vec::new(),
            offsets: Vec::new(),
        }
    }
}

impl<T> ResMap<T> {
    /// Creates a map from named values in array order.
    pub fn from_named(values: Vec<(String, T)>) -> Self {
        let (names, values): (Vec<_>, Vec<_>) = values.into_iter().unzip();
        let nodes = names
            .into_iter()
            .map(|key| DictNode {
                reference: 0,
                left: 0,
                right: 0,
                key,
            })
            .collect();
        Self {
            dict: ResDict::from_nodes(nodes),
            values,
            offsets: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.dict.index_of(name).and_then(|i| self.values.get(i))
    }

    pub fn get_index(&self, index: usize) -> Option<&T> {
        self.values.get(index)
    }

    /// The byte offset the element named `name` was loaded from.
    pub fn offset_of(&self, name: &str) -> Option<u64> {
        self.dict.index_of(name).and_then(|i| self.offsets.get(i).copied())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.dict.keys()
    }

    /// The values in array order.
    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn into_values(self) -> Vec<T> {
        self.values
    }

    /// Pairs of names and values in array order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.dict.keys().zip(self.values.iter())
    }

    /// Converts each value while keeping the names and offsets.
    pub fn try_map<U, E, F>(self, mut f: F) -> Result<ResMap<U>, E>
    where
        F: FnMut(T) -> Result<U, E>,
    {
        let values = self
            .values
            .into_iter()
            .map(&mut f)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ResMap {
            dict: self.dict,
            values,
            offsets: self.offsets,
        })
    }
}

fn check_count(
    reader: &ByteCursor,
    offset: u64,
    count: usize,
    element_size: u64,
) -> Result<(), DecodeError> {
    let end = (count as u64)
        .checked_mul(element_size)
        .and_then(|size| size.checked_add(offset));
    match end {
        Some(end) if end <= reader.len() => Ok(()),
        _ => Err(DecodeError::MalformedFile(format!(
            "Array of {} elements at offset 0x{:X} exceeds the file size.",
            count, offset
        ))),
    }
}

fn load_array_with_offsets<T: Loadable>(
    reader: &mut ByteCursor,
    offset: Option<u64>,
    count: usize,
) -> Result<(Vec<T>, Vec<u64>), DecodeError> {
    match offset {
        Some(offset) if count > 0 => reader.temporary_seek(offset, |r| {
            // Every element occupies at least one byte.
            check_count(r, offset, count, 1)?;
            let mut values = Vec::with_capacity(count);
            let mut offsets = Vec::with_capacity(count);
            for _ in 0..count {
                offsets.push(r.position());
                values.push(T::load(r)?);
            }
            Ok((values, offsets))
        }),
        _ => Ok((Vec::new(), Vec::new())),
    }
}

/// Loads `count` consecutive elements starting at `offset`.
pub fn load_array<T: Loadable>(
    reader: &mut ByteCursor,
    offset: Option<u64>,
    count: usize,
) -> Result<Vec<T>, DecodeError> {
    load_array_with_offsets(reader, offset, count).map(|(values, _)| values)
}

/// Loads an element at each of the `count` 64 bit offsets stored at `offset`.
pub fn load_pointer_array<T: Loadable>(
    reader: &mut ByteCursor,
    offset: Option<u64>,
    count: usize,
) -> Result<Vec<T>, DecodeError> {
    load_pointer_table(reader, offset, count)?
        .into_iter()
        .map(|pointer| reader.temporary_seek(pointer, T::load))
        .collect()
}

/// Reads the `count` 64 bit offsets stored at `offset`.
pub fn load_pointer_table(
    reader: &mut ByteCursor,
    offset: Option<u64>,
    count: usize,
) -> Result<Vec<u64>, DecodeError> {
    load_values::<u64>(reader, offset, count)
}

/// Loads `count` consecutive elements at `offset` named by the dictionary at `dict_offset`.
pub fn load_dict<T: Loadable>(
    reader: &mut ByteCursor,
    offset: Option<u64>,
    dict_offset: Option<u64>,
    count: usize,
) -> Result<ResMap<T>, DecodeError> {
    let dict = load_res_dict(reader, dict_offset)?;
    let (values, offsets) = load_array_with_offsets(reader, offset, count)?;
    if dict.len() != values.len() {
        return Err(DecodeError::MalformedFile(format!(
            "Dictionary has {} entries but the array has {} elements.",
            dict.len(),
            values.len()
        )));
    }

    Ok(ResMap {
        dict,
        values,
        offsets,
    })
}

/// Loads the dictionary at `offset` or an empty dictionary if there is no offset.
pub fn load_res_dict(reader: &mut ByteCursor, offset: Option<u64>) -> Result<ResDict, DecodeError> {
    match offset {
        Some(offset) => reader.temporary_seek(offset, ResDict::load),
        None => Ok(ResDict::default()),
    }
}

/// Reads `count` consecutive values of a fixed size [BinRead] type at `offset`.
pub fn load_values<T: BinRead<Args = ()>>(
    reader: &mut ByteCursor,
    offset: Option<u64>,
    count: usize,
) -> Result<Vec<T>, DecodeError> {
    match offset {
        Some(offset) if count > 0 => reader.temporary_seek(offset, |r| {
            check_count(r, offset, count, std::mem::size_of::<T>() as u64)?;
            (0..count).map(|_| r.read_struct::<T>()).collect()
        }),
        _ => Ok(Vec::new()),
    }
}

/// Reads `count` string offsets at `offset` named by the dictionary at `dict_offset`.
pub fn load_string_dict(
    reader: &mut ByteCursor,
    offset: Option<u64>,
    dict_offset: Option<u64>,
    count: usize,
) -> Result<ResMap<String>, DecodeError> {
    let dict = load_res_dict(reader, dict_offset)?;
    let values = load_string_array(reader, offset, count)?;
    if dict.len() != values.len() {
        return Err(DecodeError::MalformedFile(format!(
            "Dictionary has {} entries but the string array has {} elements.",
            dict.len(),
            values.len()
        )));
    }

    let offsets = match offset {
        Some(offset) => (0..values.len() as u64).map(|i| offset + i * 8).collect(),
        None => Vec::new(),
    };
    Ok(ResMap {
        dict,
        values,
        offsets,
    })
}

/// Reads `count` 64 bit string offsets at `offset` and the strings they point to.
pub fn load_string_array(
    reader: &mut ByteCursor,
    offset: Option<u64>,
    count: usize,
) -> Result<Vec<String>, DecodeError> {
    match offset {
        Some(offset) if count > 0 => reader.temporary_seek(offset, |r| {
            check_count(r, offset, count, 8)?;
            (0..count).map(|_| r.read_name()).collect()
        }),
        _ => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hex_bytes;

    #[derive(Debug, PartialEq)]
    struct Element(u16);

    impl Loadable for Element {
        fn load(reader: &mut ByteCursor) -> Result<Self, DecodeError> {
            reader.read_signature(b"EL")?;
            reader.read_u16().map(Element)
        }
    }

    #[test]
    fn load_array_restores_position() {
        let data = hex_bytes("00000000 454C0100 454C0200");
        let mut reader = ByteCursor::new(&data);
        reader.seek(2).unwrap();
        let values: Vec<Element> = load_array(&mut reader, Some(4), 2).unwrap();
        assert_eq!(vec![Element(1), Element(2)], values);
        assert_eq!(2, reader.position());
    }

    #[test]
    fn load_array_null_offset() {
        let data = hex_bytes("00000000");
        let mut reader = ByteCursor::new(&data);
        let values: Vec<Element> = load_array(&mut reader, None, 3).unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn load_array_bad_signature() {
        let data = hex_bytes("454C0100 58580200");
        let mut reader = ByteCursor::new(&data);
        let result = load_array::<Element>(&mut reader, Some(0), 2);
        assert!(matches!(result, Err(DecodeError::SignatureMismatch { offset: 4, .. })));
        assert_eq!(0, reader.position());
    }

    #[test]
    fn load_pointer_array_elements() {
        let data = hex_bytes(
            "1400000000000000 1000000000000000
             454C0200 454C0100",
        );
        let mut reader = ByteCursor::new(&data);
        let values: Vec<Element> = load_pointer_array(&mut reader, Some(0), 2).unwrap();
        assert_eq!(vec![Element(1), Element(2)], values);
        assert_eq!(0, reader.position());
    }

    #[test]
    fn load_dict_elements() {
        let data = hex_bytes(
            "454C0100 454C0200
             5F444943 02000000
             FFFFFFFF 0100 0000 0000000000000000
             00000000 0000 0000 4000000000000000
             00000000 0000 0000 4600000000000000
             0300 746F70 00
             0300 616E79 00",
        );
        let mut reader = ByteCursor::new(&data);
        let map: ResMap<Element> = load_dict(&mut reader, Some(0), Some(8), 2).unwrap();
        assert_eq!(Some(&Element(1)), map.get("top"));
        assert_eq!(Some(&Element(2)), map.get("any"));
        assert_eq!(Some(4), map.offset_of("any"));
        assert_eq!(None, map.get("none"));
        assert_eq!(
            vec![("top", &Element(1)), ("any", &Element(2))],
            map.iter().collect::<Vec<_>>()
        );
        assert_eq!(0, reader.position());
    }

    #[test]
    fn load_dict_count_mismatch() {
        let data = hex_bytes(
            "454C0100 00000000
             5F444943 00000000
             FFFFFFFF 0000 0000 0000000000000000",
        );
        let mut reader = ByteCursor::new(&data);
        let result = load_dict::<Element>(&mut reader, Some(0), Some(8), 1);
        assert!(matches!(result, Err(DecodeError::MalformedFile(_))));
    }

    #[test]
    fn load_u16_values() {
        let data = hex_bytes("0100 0200 0300");
        let mut reader = ByteCursor::new(&data);
        assert_eq!(
            vec![2u16, 3u16],
            load_values::<u16>(&mut reader, Some(2), 2).unwrap()
        );
        assert_eq!(0, reader.position());
    }

    #[test]
    fn load_values_past_end() {
        let data = hex_bytes("0100 0200");
        let mut reader = ByteCursor::new(&data);
        assert!(matches!(
            load_values::<u16>(&mut reader, Some(2), 2),
            Err(DecodeError::MalformedFile(_))
        ));
    }

    #[test]
    fn load_strings() {
        let data = hex_bytes(
            "1000000000000000 1600000000000000
             0300 5F6130 00 0300 5F6E30 00",
        );
        let mut reader = ByteCursor::new(&data);
        assert_eq!(
            vec!["_a0".to_string(), "_n0".to_string()],
            load_string_array(&mut reader, Some(0), 2).unwrap()
        );
    }
}
