//! owner name resolution.

use {
    crate::source::SourceError,
    parking_lot::Mutex,
    std::{
        collections::HashMap,
        fs,
        path::PathBuf,
    },
    tracing::debug,
};

/// an append-only memo of uid to user name, backed by a `passwd(5)` file.
///
/// entries are never invalidated; the memo lives as long as its owner, which is one run of the
/// monitor. uids missing from the file are remembered as misses too.
#[derive(Debug)]
pub struct UserNames {
    passwd: PathBuf,
    /// `None` marks a uid the file had no entry for.
    names: Mutex<HashMap<u32, Option<String>>>,
}

impl UserNames {
    pub const PASSWD: &str = "/etc/passwd";

    pub fn new(passwd: impl Into<PathBuf>) -> Self {
        Self {
            passwd: passwd.into(),
            names: Mutex::default(),
        }
    }

    /// resolves `uid`, reading the passwd file only for a uid it has not seen.
    ///
    /// a uid with no entry is [`SourceError::NotFound`], and stays so for the life of the memo.
    pub fn resolve(&self, uid: u32) -> Result<String, SourceError> {
        if let Some(known) = self.names.lock().get(&uid) {
            return self.found(known.clone());
        }

        let text =
            fs::read_to_string(&self.passwd).map_err(|e| SourceError::io(&self.passwd, e))?;

        let mut names = self.names.lock();
        for (id, name) in Self::entries(&text) {
            names.entry(id).or_insert_with(|| Some(name.to_owned()));
        }
        let known = names.entry(uid).or_insert(None).clone();
        debug!(uid, known = names.len(), "scanned {}", self.passwd.display());

        self.found(known)
    }

    fn found(&self, name: Option<String>) -> Result<String, SourceError> {
        name.ok_or_else(|| SourceError::NotFound {
            path: self.passwd.clone(),
        })
    }

    /// yields `(uid, name)` for each well-formed `name:passwd:uid:...` line.
    fn entries(text: &str) -> impl Iterator<Item = (u32, &str)> {
        text.lines()
            .filter(|line| !line.starts_with('#'))
            .filter_map(|line| {
                let mut fields = line.split(':');
                let name = fields.next().filter(|n| !n.is_empty())?;
                let uid = fields.nth(1)?.parse().ok()?;
                Some((uid, name))
            })
    }
}

impl Default for UserNames {
    fn default() -> Self {
        Self::new(Self::PASSWD)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::io::Write};

    const PASSWD: &str = "\
root:x:0:0:root:/root:/bin/bash
# a comment
daemon:x:1:1:daemon:/usr/sbin:/usr/sbin/nologin
broken-line
kate:x:1000:1000:katelyn:/home/kate:/bin/zsh
";

    fn passwd(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn resolves_known_uids() {
        let file = passwd(PASSWD);
        let users = UserNames::new(file.path());
        assert_eq!(users.resolve(0).unwrap(), "root");
        assert_eq!(users.resolve(1000).unwrap(), "kate");
    }

    #[test]
    fn unknown_uid_is_not_found() {
        let file = passwd(PASSWD);
        let users = UserNames::new(file.path());
        assert!(users.resolve(4242).unwrap_err().is_not_found());
    }

    #[test]
    fn misses_are_remembered() {
        let file = passwd(PASSWD);
        let users = UserNames::new(file.path());
        assert!(users.resolve(4242).unwrap_err().is_not_found());

        // the file is not consulted again for a uid it had no entry for.
        std::fs::write(file.path(), "late:x:4242:4242::/:/bin/sh\n").unwrap();
        assert!(users.resolve(4242).unwrap_err().is_not_found());
        assert_eq!(users.resolve(0).unwrap(), "root");
    }

    #[test]
    fn memo_survives_the_file() {
        let file = passwd(PASSWD);
        let users = UserNames::new(file.path());
        assert_eq!(users.resolve(1).unwrap(), "daemon");

        // the memo is never invalidated, so the file is not consulted again.
        std::fs::write(file.path(), "other:x:1:1::/:/bin/sh\n").unwrap();
        assert_eq!(users.resolve(1).unwrap(), "daemon");
        assert_eq!(users.resolve(1000).unwrap(), "kate");
    }

    #[test]
    fn missing_file_is_not_found() {
        let users = UserNames::new("/nonexistent/passwd");
        assert!(users.resolve(0).unwrap_err().is_not_found());
    }
}
