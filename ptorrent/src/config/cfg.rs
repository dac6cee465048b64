use std::fs::File;
use std::io;
use std::io::BufRead;
use std::io::BufReader;
use std::str::FromStr;

use super::constants;

/// `Cfg` struct containing the config file information, previusly created with `Cfg::new`.
///
/// - `tcp_port`: port the seeder listens on for incoming peer connections,
/// - `download_directory`: directory where downloaded files will be stored,
/// - `connect_seconds_timeout`: timeout in seconds for connecting to a peer,
/// - `read_write_seconds_timeout`: timeout in seconds for the read and write operations to a peer,
/// - `inactivity_seconds_timeout`: seconds without any frame after which a peer is considered dead,
/// - `max_peers_per_download`: maximum number of simultaneous peer connections per download,
/// - `max_frame_kb_size`: max frame payload size in kilobytes accepted by the wire decoder,
#[derive(Debug, Clone)]
pub struct Cfg {
    pub tcp_port: u16,
    pub download_directory: String,
    pub connect_seconds_timeout: u64,
    pub read_write_seconds_timeout: u64,
    pub inactivity_seconds_timeout: u64,
    pub max_peers_per_download: u32,
    pub max_frame_kb_size: u32,
}

impl Cfg {
    /// Builds a Cfg struct containing the config file information by the given path.
    /// The format of the config file must be: {config_name}={config_value} (without brackets).
    /// In case of success it returns a Cfg struct.
    ///
    /// It returns an io::Error if:
    /// - The path to the config file does not exist or could not be open/readed.
    /// - The config file has wrong format.
    /// - A wrong config_name was in the config file.
    /// - A numeric setting is not a valid number in the config file.
    /// - Minimum number of correct settings were not reached.
    pub fn new(path: &str) -> io::Result<Self> {
        let mut cfg = Self {
            tcp_port: 0,
            download_directory: String::from(""),
            connect_seconds_timeout: 0,
            read_write_seconds_timeout: 0,
            inactivity_seconds_timeout: 0,
            max_peers_per_download: 0,
            max_frame_kb_size: 0,
        };

        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut settings_loaded = 0;

        for line in reader.lines() {
            let current_line = line?;
            let setting: Vec<&str> = current_line.split('=').collect();

            if setting.len() != 2 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Invalid config input: {}", current_line),
                ));
            }
            cfg = Self::load_setting(cfg, setting[0], setting[1])?;
            settings_loaded += 1;
        }
        if settings_loaded < constants::MIN_SETTINGS {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Minimum number of correct settings were not reached: {}",
                    settings_loaded
                ),
            ));
        }
        Ok(cfg)
    }

    /// Maximum frame payload length in bytes accepted by the wire decoder.
    pub fn max_frame_length(&self) -> u32 {
        self.max_frame_kb_size * 1024
    }

    fn load_setting(mut self, name: &str, value: &str) -> io::Result<Self> {
        match name {
            constants::TCP_PORT => {
                self.tcp_port = self.parse_value(value, constants::TCP_PORT)?;
            }
            constants::DOWNLOAD_DIRECTORY => self.download_directory = String::from(value),

            constants::CONNECT_SECONDS_TIMEOUT => {
                self.connect_seconds_timeout =
                    self.parse_value(value, constants::CONNECT_SECONDS_TIMEOUT)?;
            }

            constants::READ_WRITE_SECONDS_TIMEOUT => {
                self.read_write_seconds_timeout =
                    self.parse_value(value, constants::READ_WRITE_SECONDS_TIMEOUT)?;
            }

            constants::INACTIVITY_SECONDS_TIMEOUT => {
                self.inactivity_seconds_timeout =
                    self.parse_value(value, constants::INACTIVITY_SECONDS_TIMEOUT)?;
            }

            constants::MAX_PEERS_PER_DOWNLOAD => {
                self.max_peers_per_download =
                    self.parse_value(value, constants::MAX_PEERS_PER_DOWNLOAD)?;
            }

            constants::MAX_FRAME_KB_SIZE => {
                self.max_frame_kb_size = self.parse_value(value, constants::MAX_FRAME_KB_SIZE)?;
            }

            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Invalid config setting name: {}", name),
                ))
            }
        }
        Ok(self)
    }

    fn parse_value<F>(&self, value: &str, setting: &str) -> io::Result<F>
    where
        F: FromStr,
    {
        match value.parse::<F>() {
            Err(_) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Invalid setting: {}, is not a valid type: {}",
                    setting, value
                ),
            )),
            Ok(parsed) => Ok(parsed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs, io::Write};

    #[test]
    fn test_good_config() {
        let path = "./test_good_config.cfg";
        let contents = b"TCP_PORT=6881\nDOWNLOAD_DIRECTORY=./downloads\nCONNECT_SECONDS_TIMEOUT=10\nREAD_WRITE_SECONDS_TIMEOUT=5\nINACTIVITY_SECONDS_TIMEOUT=120\nMAX_PEERS_PER_DOWNLOAD=3\nMAX_FRAME_KB_SIZE=4096";
        create_and_write_file(path, contents);

        let config = Cfg::new(path);
        assert!(config.is_ok());

        let config = config.unwrap();
        assert_eq!(config.tcp_port, 6881);
        assert_eq!(config.download_directory, "./downloads");
        assert_eq!(config.connect_seconds_timeout, 10);
        assert_eq!(config.read_write_seconds_timeout, 5);
        assert_eq!(config.inactivity_seconds_timeout, 120);
        assert_eq!(config.max_peers_per_download, 3);
        assert_eq!(config.max_frame_kb_size, 4096);
        assert_eq!(config.max_frame_length(), 4096 * 1024);

        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_bad_path() {
        let path = "bad path";
        let config = Cfg::new(path);
        assert!(config.is_err());
    }

    #[test]
    fn test_empty_file() {
        let path = "./test_empty_file.cfg";
        let contents = b"";
        create_and_write_file(path, contents);

        create_and_assert_config_is_not_ok(path);
    }

    #[test]
    fn test_setting_doesnt_exist() {
        let path = "./test_setting_doesnt_exist.cfg";
        let contents = b"WRONG_SETTING=1000";
        create_and_write_file(path, contents);

        create_and_assert_config_is_not_ok(path);
    }

    #[test]
    fn test_bad_number_of_settings() {
        let path = "./test_bad_number_of_settings.cfg";
        let contents = b"TCP_PORT=6881\nDOWNLOAD_DIRECTORY=./downloads";
        create_and_write_file(path, contents);

        create_and_assert_config_is_not_ok(path);
    }

    #[test]
    fn test_tcp_port_not_a_number() {
        let path = "./test_tcp_port_not_a_number.cfg";
        let contents = b"TCP_PORT=abcd\nDOWNLOAD_DIRECTORY=./downloads\nCONNECT_SECONDS_TIMEOUT=10\nREAD_WRITE_SECONDS_TIMEOUT=5\nINACTIVITY_SECONDS_TIMEOUT=120\nMAX_PEERS_PER_DOWNLOAD=3\nMAX_FRAME_KB_SIZE=4096";
        create_and_write_file(path, contents);

        create_and_assert_config_is_not_ok(path);
    }

    #[test]
    fn test_max_peers_not_a_number() {
        let path = "./test_max_peers_not_a_number.cfg";
        let contents = b"TCP_PORT=6881\nDOWNLOAD_DIRECTORY=./downloads\nCONNECT_SECONDS_TIMEOUT=10\nREAD_WRITE_SECONDS_TIMEOUT=5\nINACTIVITY_SECONDS_TIMEOUT=120\nMAX_PEERS_PER_DOWNLOAD=lots\nMAX_FRAME_KB_SIZE=4096";
        create_and_write_file(path, contents);

        create_and_assert_config_is_not_ok(path);
    }

    #[test]
    fn test_order_doesnt_matter() {
        let path = "./test_order_doesnt_matter.cfg";
        let contents = b"MAX_FRAME_KB_SIZE=2048\nDOWNLOAD_DIRECTORY=./other\nINACTIVITY_SECONDS_TIMEOUT=60\nTCP_PORT=7000\nMAX_PEERS_PER_DOWNLOAD=5\nCONNECT_SECONDS_TIMEOUT=3\nREAD_WRITE_SECONDS_TIMEOUT=2";
        create_and_write_file(path, contents);

        let config = Cfg::new(path);
        assert!(config.is_ok());

        let config = config.unwrap();
        assert_eq!(config.tcp_port, 7000);
        assert_eq!(config.download_directory, "./other");
        assert_eq!(config.max_peers_per_download, 5);

        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_bad_format() {
        let path = "./test_bad_format.cfg";
        let contents = b"TCP_PORT=abcd=1234\nDOWNLOAD_DIRECTORY=./downloads\nCONNECT_SECONDS_TIMEOUT=10\nREAD_WRITE_SECONDS_TIMEOUT=5\nINACTIVITY_SECONDS_TIMEOUT=120\nMAX_PEERS_PER_DOWNLOAD=3\nMAX_FRAME_KB_SIZE=4096";
        create_and_write_file(path, contents);

        create_and_assert_config_is_not_ok(path);
    }

    // Auxiliary functions

    fn create_and_write_file(path: &str, contents: &[u8]) {
        let mut file = File::create(path).unwrap();
        file.write_all(contents).unwrap();
    }

    fn create_and_assert_config_is_not_ok(path: &str) {
        let config = Cfg::new(path);
        assert!(config.is_err());
        fs::remove_file(path).unwrap();
    }
}
