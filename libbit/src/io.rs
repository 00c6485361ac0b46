use crate::hash::{Oid, SHA1Hash};
use crate::path::BitPath;
use crate::serialize::Deserialize;
use crate::time::Timespec;
use crate::{error::BitResult, serialize::Serialize};
use sha1::Digest;
use std::ffi::OsStr;
use std::fmt::Display;
use std::fs::File;
use std::io::{self, prelude::*, BufReader};
use std::mem::MaybeUninit;
use std::os::unix::prelude::OsStrExt;

pub type BufferedFileStream = std::io::BufReader<File>;

// all big-endian
pub(crate) trait ReadExt: Read {
    #[inline]
    fn read_u8(&mut self) -> io::Result<u8> {
        let mut i = 0u8;
        self.read_exact(&mut std::slice::from_mut(&mut i))?;
        Ok(i)
    }

    #[inline]
    fn read_u16(&mut self) -> io::Result<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    #[inline]
    fn read_u32(&mut self) -> io::Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    #[inline]
    fn read_timespec(&mut self) -> io::Result<Timespec> {
        let sec = self.read_u32()?;
        let nano = self.read_u32()?;
        Ok(Timespec::new(sec, nano))
    }

    #[inline]
    fn read_u64(&mut self) -> io::Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    #[inline]
    fn read_oid(&mut self) -> io::Result<Oid> {
        let mut buf = [0u8; 20];
        self.read_exact(&mut buf)?;
        Ok(Oid::new(buf))
    }

    #[inline]
    // named str to not clash with the existing method
    fn read_to_str(&mut self) -> io::Result<String> {
        let mut buf = String::new();
        self.read_to_string(&mut buf)?;
        Ok(buf)
    }

    #[inline]
    fn read_to_vec(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = vec![];
        self.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl<R: Read + ?Sized> ReadExt for R {
}

impl Deserialize for u64 {
    fn deserialize(reader: &mut impl BufRead) -> BitResult<Self>
    where
        Self: Sized,
    {
        Ok(reader.read_u64()?)
    }
}

impl Deserialize for u8 {
    fn deserialize(reader: &mut impl BufRead) -> BitResult<Self>
    where
        Self: Sized,
    {
        Ok(reader.read_u8()?)
    }
}

impl Deserialize for u32 {
    fn deserialize(reader: &mut impl BufRead) -> BitResult<Self>
    where
        Self: Sized,
    {
        Ok(reader.read_u32()?)
    }
}

impl Deserialize for Oid {
    fn deserialize(reader: &mut impl BufRead) -> BitResult<Self>
    where
        Self: Sized,
    {
        Ok(reader.read_oid()?)
    }
}

impl Deserialize for Vec<u8> {
    fn deserialize(reader: &mut impl BufRead) -> BitResult<Self>
    where
        Self: Sized,
    {
        Ok(reader.read_to_vec()?)
    }
}

#[cfg(test)]
impl Serialize for Vec<u8> {
    fn serialize(&self, writer: &mut dyn Write) -> BitResult<()> {
        Ok(writer.write_all(self)?)
    }
}

impl Serialize for [u8] {
    fn serialize(&self, writer: &mut dyn Write) -> BitResult<()> {
        Ok(writer.write_all(self)?)
    }
}

// this trait exists as passing `self` to `T::deserialize` which takes a `dyn mut BufRead`
// requires `Self: Sized`. Not entirely sure why atm.
pub trait BufReadExtSized: BufRead + Sized {
    fn read_array<T: Deserialize, const N: usize>(&mut self) -> BitResult<[T; N]> {
        let mut xs: [MaybeUninit<T>; N] = unsafe { MaybeUninit::uninit().assume_init() };
        for x in xs.iter_mut() {
            *x = MaybeUninit::new(T::deserialize(&mut *self)?);
        }
        Ok(unsafe { std::mem::transmute_copy(&xs) })
    }

    fn read_type<T: Deserialize>(&mut self) -> BitResult<T> {
        T::deserialize(self)
    }

    fn read_vec<T: Deserialize>(&mut self, n: usize) -> BitResult<Vec<T>> {
        let mut vec = Vec::with_capacity(n);
        for _ in 0..n {
            vec.push(T::deserialize(&mut *self)?);
        }
        Ok(vec)
    }
}

impl<R: BufRead> BufReadExtSized for R {
}

pub trait BufReadExt: BufRead {
    fn read_null_terminated_path(&mut self) -> BitResult<BitPath> {
        self.read_null_terminated()
    }

    // `n` should be at most the length of the path to read excluding the null byte
    fn read_null_terminated_path_skip_n(&mut self, n: usize) -> BitResult<BitPath> {
        let mut buf = vec![0; n];
        // optimization when we know how many bytes we can read
        self.read_exact(&mut buf)?;
        self.read_until(0, &mut buf)?;
        // ignore the null character
        Ok(BitPath::intern(OsStr::from_bytes(&buf[..buf.len() - 1])))
    }

    fn read_null_terminated<T: Deserialize>(&mut self) -> BitResult<T> {
        let mut buf = vec![];
        self.read_until(0, &mut buf)?;
        // ignore the null character
        T::deserialize(&mut BufReader::new(&buf[..buf.len() - 1]))
    }

    fn is_at_eof(&mut self) -> io::Result<bool> {
        Ok(self.fill_buf()?.is_empty())
    }
}

impl<R: BufRead + ?Sized> BufReadExt for R {
}

pub trait WriteExt: Write {
    fn write_u8(&mut self, u: u8) -> io::Result<()> {
        self.write_all(std::slice::from_ref(&u))
    }

    fn write_u16(&mut self, u: u16) -> io::Result<()> {
        self.write_all(&u.to_be_bytes())
    }

    fn write_u32(&mut self, u: u32) -> io::Result<()> {
        self.write_all(&u.to_be_bytes())
    }

    fn write_ascii_num(&mut self, i: impl Display, sep: u8) -> io::Result<()> {
        self.write_all(i.to_string().as_bytes())?;
        self.write_u8(sep)
    }

    fn write_timespec(&mut self, t: Timespec) -> io::Result<()> {
        self.write_u32(t.sec)?;
        self.write_u32(t.nano)
    }

    fn write_u64(&mut self, u: u64) -> io::Result<()> {
        self.write_all(&u.to_be_bytes())
    }

    fn write_null_terminated_path(&mut self, path: BitPath) -> io::Result<()> {
        self.write_all(path.as_bytes())?;
        self.write_u8(0)?;
        Ok(())
    }

    fn write_oid(&mut self, oid: Oid) -> io::Result<()> {
        self.write_all(oid.as_bytes())
    }

    /// write `data` prefixed by its serialized size in bytes as a u32
    fn write_with_size(&mut self, data: impl Serialize) -> BitResult<()> {
        let mut buf = vec![];
        data.serialize(&mut buf)?;

        self.write_u32(buf.len() as u32)?;
        self.write_all(&buf)?;
        Ok(())
    }
}

impl<W: Write + ?Sized> WriteExt for W {
}

pub(crate) struct HashReader<'a, D> {
    reader: &'a mut dyn BufRead,
    hasher: D,
}

impl<'a, D: Digest> BufRead for HashReader<'a, D> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.reader.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.reader.consume(amt)
    }
}

impl<'a, D: Digest> Read for HashReader<'a, D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reader.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

impl<'a, D: Digest> HashReader<'a, D> {
    pub fn new(reader: &'a mut dyn BufRead) -> Self {
        Self { reader, hasher: D::new() }
    }
}

impl<'a> HashReader<'a, sha1::Sha1> {
    pub fn new_sha1(reader: &'a mut dyn BufRead) -> Self {
        Self::new(reader)
    }

    pub fn finalize_sha1_hash(&mut self) -> SHA1Hash {
        SHA1Hash::from(self.hasher.finalize_reset())
    }
}

/// hashes all the bytes written into the writer using `D`
pub(crate) struct HashWriter<'a, D> {
    writer: &'a mut dyn Write,
    hasher: D,
}

impl<'a, D: Digest> Write for HashWriter<'a, D> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.writer.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl<'a, D: Digest> HashWriter<'a, D> {
    pub fn new(writer: &'a mut dyn Write) -> Self {
        Self { writer, hasher: D::new() }
    }
}

impl<'a> HashWriter<'a, sha1::Sha1> {
    pub fn new_sha1(writer: &'a mut dyn Write) -> Self {
        Self::new(writer)
    }

    pub fn write_hash(self) -> io::Result<()> {
        let hash = SHA1Hash::from(self.hasher.finalize());
        self.writer.write_oid(hash)
    }
}
