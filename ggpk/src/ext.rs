use byteorder::{ReadBytesExt, LE};

pub trait ReadExt {
    fn read_len(&mut self, len: usize) -> Result<Vec<u8>, super::Error>;
    fn read_sha256(&mut self) -> Result<[u8; 32], super::Error>;
    /// NUL-terminated byte string; the terminator is consumed and dropped.
    fn read_cstring(&mut self) -> Result<Vec<u8>, super::Error>;
    /// `units` UTF-16 code units, trailing NUL trimmed.
    fn read_utf16(&mut self, units: u32) -> Result<String, super::Error>;
    /// `units` UTF-32 code points, trailing NUL trimmed.
    fn read_utf32(&mut self, units: u32) -> Result<String, super::Error>;
}

impl<R: std::io::Read> ReadExt for R {
    fn read_len(&mut self, len: usize) -> Result<Vec<u8>, super::Error> {
        let mut buf = vec![0; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn read_sha256(&mut self) -> Result<[u8; 32], super::Error> {
        let mut hash = [0; 32];
        self.read_exact(&mut hash)?;
        Ok(hash)
    }

    fn read_cstring(&mut self) -> Result<Vec<u8>, super::Error> {
        let mut buf = Vec::new();
        loop {
            match self.read_u8()? {
                0 => return Ok(buf),
                b => buf.push(b),
            }
        }
    }

    fn read_utf16(&mut self, units: u32) -> Result<String, super::Error> {
        let mut buf = Vec::with_capacity(units as usize);
        for _ in 0..units {
            buf.push(self.read_u16::<LE>()?);
        }
        if buf.last() == Some(&0) {
            buf.pop();
        }
        Ok(String::from_utf16_lossy(&buf))
    }

    fn read_utf32(&mut self, units: u32) -> Result<String, super::Error> {
        let mut name = String::with_capacity(units as usize);
        for _ in 0..units {
            match char::from_u32(self.read_u32::<LE>()?) {
                Some('\0') => {}
                Some(c) => name.push(c),
                None => name.push(char::REPLACEMENT_CHARACTER),
            }
        }
        Ok(name)
    }
}
