//! On-disk tuning parameters (`settings.xml`) and the [Config] builder
//! used only at `create` time, mirroring `robt::Config`'s `set_*`
//! builder methods and sane defaults.

use quick_xml::{
    events::{BytesEnd, BytesStart, BytesText, Event},
    Reader, Writer,
};

use std::{collections::HashMap, ffi, fs, path::Path};

use crate::{encoding, err_at, Error, Result};

pub const SETTINGS_FILE: &str = "settings.xml";

/// Default hash-block size in bytes, 4096 -- one filesystem page.
pub const HASH_BLOCK_SIZE: u64 = 4096;
/// Default number of index bits `k`, the middle of the legal [32, 40] range.
pub const NUMBER_OF_INDEX_BITS: u32 = 36;
/// Default bloom-1 bit-array size exponent.
pub const BLOOM_1_M_HASH_SIZE: u32 = 24;

/// The digest kind a database is built against, fixed for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashDigestKind {
    Md5,
    Sha1,
    Sha256,
    Straight16,
    Straight64,
}

impl HashDigestKind {
    /// Width in bytes of a digest of this kind.
    pub fn byte_width(&self) -> usize {
        match self {
            HashDigestKind::Md5 => 16,
            HashDigestKind::Sha1 => 20,
            HashDigestKind::Sha256 => 32,
            HashDigestKind::Straight16 => 16,
            HashDigestKind::Straight64 => 8,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HashDigestKind::Md5 => "MD5",
            HashDigestKind::Sha1 => "SHA1",
            HashDigestKind::Sha256 => "SHA256",
            HashDigestKind::Straight16 => "STRAIGHT16",
            HashDigestKind::Straight64 => "STRAIGHT64",
        }
    }

    pub fn parse(s: &str) -> Result<HashDigestKind> {
        match s {
            "MD5" => Ok(HashDigestKind::Md5),
            "SHA1" => Ok(HashDigestKind::Sha1),
            "SHA256" => Ok(HashDigestKind::Sha256),
            "STRAIGHT16" => Ok(HashDigestKind::Straight16),
            "STRAIGHT64" => Ok(HashDigestKind::Straight64),
            _ => err_at!(Config, msg: "unknown hashdigest_type {:?}", s),
        }
    }
}

/// One bloom filter's settings slot, `{used, k_hash_functions, M_hash_size}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BloomSettings {
    pub used: bool,
    pub k_hash_functions: u32,
    pub m_hash_size: u32,
}

impl Default for BloomSettings {
    fn default() -> Self {
        BloomSettings {
            used: true,
            k_hash_functions: crate::bloom::DEFAULT_K_HASH_FUNCTIONS,
            m_hash_size: BLOOM_1_M_HASH_SIZE,
        }
    }
}

/// Database-wide tuning parameters, persisted as `settings.xml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub settings_version: u32,
    pub hashdigest_type: HashDigestKind,
    pub hash_block_size: u64,
    pub byte_alignment: u64,
    /// 0 means unlimited.
    pub maximum_hash_duplicates: u32,
    pub number_of_index_bits: u32,
    pub bloom1: BloomSettings,
    pub bloom2: BloomSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            settings_version: 1,
            hashdigest_type: HashDigestKind::Md5,
            hash_block_size: HASH_BLOCK_SIZE,
            byte_alignment: HASH_BLOCK_SIZE,
            maximum_hash_duplicates: 0,
            number_of_index_bits: NUMBER_OF_INDEX_BITS,
            bloom1: BloomSettings::default(),
            bloom2: BloomSettings {
                used: false,
                ..BloomSettings::default()
            },
        }
    }
}

impl Settings {
    fn validate(&self) -> Result<()> {
        if !(encoding::MIN_INDEX_BITS..=encoding::MAX_INDEX_BITS).contains(&self.number_of_index_bits) {
            return err_at!(
                Config, msg: "number_of_index_bits {} outside [{},{}]",
                self.number_of_index_bits, encoding::MIN_INDEX_BITS, encoding::MAX_INDEX_BITS
            );
        }
        if self.hash_block_size == 0 {
            return err_at!(Config, msg: "hash_block_size must be non-zero");
        }
        Ok(())
    }

    pub fn write(&self, dir: &ffi::OsStr) -> Result<()> {
        self.validate()?;
        let path = Path::new(dir).join(SETTINGS_FILE);
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

        let root = BytesStart::new("settings");
        err_at!(DecodeFail, writer.write_event(Event::Start(root.clone())))?;

        write_scalar(&mut writer, "settings_version", &self.settings_version.to_string())?;
        write_scalar(&mut writer, "hashdigest_type", self.hashdigest_type.as_str())?;
        write_scalar(&mut writer, "hash_block_size", &self.hash_block_size.to_string())?;
        write_scalar(&mut writer, "byte_alignment", &self.byte_alignment.to_string())?;
        write_scalar(
            &mut writer,
            "maximum_hash_duplicates",
            &self.maximum_hash_duplicates.to_string(),
        )?;
        write_scalar(
            &mut writer,
            "number_of_index_bits",
            &self.number_of_index_bits.to_string(),
        )?;
        write_bloom(&mut writer, 1, &self.bloom1)?;
        write_bloom(&mut writer, 2, &self.bloom2)?;

        err_at!(DecodeFail, writer.write_event(Event::End(BytesEnd::new("settings"))))?;

        let os_path: &ffi::OsStr = path.as_os_str();
        let mut file = crate::util::create_file_a(os_path)?;
        use std::io::Write;
        err_at!(IOError, file.write_all(&writer.into_inner()))?;
        err_at!(IOError, file.sync_all())
    }

    pub fn read(dir: &ffi::OsStr) -> Result<Settings> {
        let path = Path::new(dir).join(SETTINGS_FILE);
        let text = err_at!(IOError, fs::read_to_string(&path))?;
        let fields = parse_flat_elements(&text)?;
        let settings = Settings::from_fields(&fields)?;
        settings.validate()?;
        Ok(settings)
    }

    fn from_fields(fields: &HashMap<String, String>) -> Result<Settings> {
        let get = |key: &str| -> Result<&String> {
            match fields.get(key) {
                Some(value) => Ok(value),
                None => err_at!(Config, msg: "settings.xml missing element {:?}", key),
            }
        };
        let parse_u32 = |key: &str| -> Result<u32> {
            err_at!(Config, get(key)?.parse::<u32>(), "settings.xml field {:?}", key)
        };
        let parse_u64 = |key: &str| -> Result<u64> {
            err_at!(Config, get(key)?.parse::<u64>(), "settings.xml field {:?}", key)
        };
        let parse_bool = |key: &str| -> Result<bool> { Ok(get(key)?.as_str() == "enabled") };

        Ok(Settings {
            settings_version: parse_u32("settings_version")?,
            hashdigest_type: HashDigestKind::parse(get("hashdigest_type")?)?,
            hash_block_size: parse_u64("hash_block_size")?,
            byte_alignment: parse_u64("byte_alignment")?,
            maximum_hash_duplicates: parse_u32("maximum_hash_duplicates")?,
            number_of_index_bits: parse_u32("number_of_index_bits")?,
            bloom1: BloomSettings {
                used: parse_bool("bloom_1_used")?,
                k_hash_functions: parse_u32("bloom_1_k_hash_functions")?,
                m_hash_size: parse_u32("bloom_1_M_hash_size")?,
            },
            bloom2: BloomSettings {
                used: parse_bool("bloom_2_used")?,
                k_hash_functions: parse_u32("bloom_2_k_hash_functions")?,
                m_hash_size: parse_u32("bloom_2_M_hash_size")?,
            },
        })
    }
}

fn write_scalar<W: std::io::Write>(writer: &mut Writer<W>, name: &str, value: &str) -> Result<()> {
    err_at!(DecodeFail, writer.write_event(Event::Start(BytesStart::new(name))))?;
    err_at!(DecodeFail, writer.write_event(Event::Text(BytesText::new(value))))?;
    err_at!(DecodeFail, writer.write_event(Event::End(BytesEnd::new(name))))
}

fn write_bloom<W: std::io::Write>(writer: &mut Writer<W>, n: u32, bloom: &BloomSettings) -> Result<()> {
    write_scalar(
        writer,
        &format!("bloom_{}_used", n),
        if bloom.used { "enabled" } else { "disabled" },
    )?;
    write_scalar(
        writer,
        &format!("bloom_{}_k_hash_functions", n),
        &bloom.k_hash_functions.to_string(),
    )?;
    write_scalar(
        writer,
        &format!("bloom_{}_M_hash_size", n),
        &bloom.m_hash_size.to_string(),
    )
}

/// Parse a flat `<root><a>1</a><b>2</b></root>` document into a
/// `name -> text` map. Nesting beyond one level is not part of this
/// document shape.
pub(crate) fn parse_flat_elements(text: &str) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut fields = HashMap::new();
    let mut current: Option<String> = None;
    loop {
        match err_at!(DecodeFail, reader.read_event()) {
            Ok(Event::Start(e)) => {
                let name = err_at!(DecodeFail, String::from_utf8(e.name().as_ref().to_vec()))?;
                current = Some(name);
            }
            Ok(Event::Text(e)) => {
                if let Some(name) = &current {
                    let value = err_at!(DecodeFail, e.unescape())?.into_owned();
                    fields.insert(name.clone(), value);
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(err),
        }
    }
    Ok(fields)
}

/// Builder for database-creation parameters, analogous to `robt::Config`:
/// used only at `create` time, thereafter the values live in
/// `settings.xml`.
#[derive(Debug, Clone)]
pub struct Config {
    settings: Settings,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            settings: Settings::default(),
        }
    }
}

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    pub fn set_hashdigest_type(&mut self, kind: HashDigestKind) -> &mut Self {
        self.settings.hashdigest_type = kind;
        self
    }

    pub fn set_hash_block_size(&mut self, size: u64) -> &mut Self {
        self.settings.hash_block_size = size;
        self.settings.byte_alignment = size;
        self
    }

    pub fn set_maximum_hash_duplicates(&mut self, n: u32) -> &mut Self {
        self.settings.maximum_hash_duplicates = n;
        self
    }

    pub fn set_number_of_index_bits(&mut self, k: u32) -> &mut Self {
        self.settings.number_of_index_bits = k;
        self
    }

    pub fn set_bloom1(&mut self, bloom: BloomSettings) -> &mut Self {
        self.settings.bloom1 = bloom;
        self
    }

    pub fn set_bloom2(&mut self, bloom: BloomSettings) -> &mut Self {
        self.settings.bloom2 = bloom;
        self
    }

    pub fn finalize(&self) -> Result<Settings> {
        self.settings.validate()?;
        Ok(self.settings.clone())
    }
}

#[cfg(test)]
#[path = "settings_test.rs"]
mod settings_test;
