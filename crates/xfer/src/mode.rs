//! POSIX mode bits and the `ls`-style attribute string conversions.
//!
//! The engine keeps its own constants instead of `libc` so that parsed
//! listings mean the same thing on every host platform.

pub const S_IFMT: u32 = 0o170000;
pub const S_IFSOCK: u32 = 0o140000;
pub const S_IFLNK: u32 = 0o120000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFBLK: u32 = 0o060000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFCHR: u32 = 0o020000;
pub const S_IFIFO: u32 = 0o010000;

pub const S_ISUID: u32 = 0o4000;
pub const S_ISGID: u32 = 0o2000;
pub const S_ISVTX: u32 = 0o1000;

pub const S_IRWXU: u32 = 0o700;
pub const S_IRWXG: u32 = 0o070;
pub const S_IRWXO: u32 = 0o007;

pub const S_IRUSR: u32 = 0o400;
pub const S_IWUSR: u32 = 0o200;
pub const S_IXUSR: u32 = 0o100;
pub const S_IRGRP: u32 = 0o040;
pub const S_IWGRP: u32 = 0o020;
pub const S_IXGRP: u32 = 0o010;
pub const S_IROTH: u32 = 0o004;
pub const S_IWOTH: u32 = 0o002;
pub const S_IXOTH: u32 = 0o001;

pub fn is_dir(mode: u32) -> bool {
    mode & S_IFMT == S_IFDIR
}

pub fn is_symlink(mode: u32) -> bool {
    mode & S_IFMT == S_IFLNK
}

pub fn is_regular(mode: u32) -> bool {
    mode & S_IFMT == S_IFREG
}

/// Block or character device: their listing size column carries
/// `major, minor` instead of a byte count.
pub fn is_device(mode: u32) -> bool {
    matches!(mode & S_IFMT, S_IFBLK | S_IFCHR)
}

/// Renders mode bits as the 10-character `ls -l` attribute string.
pub fn attribs_from_mode(mode: u32) -> String {
    let mut s = String::with_capacity(10);

    s.push(match mode & S_IFMT {
        S_IFREG => '-',
        S_IFLNK => 'l',
        S_IFBLK => 'b',
        S_IFCHR => 'c',
        S_IFIFO => 'p',
        S_IFSOCK => 's',
        S_IFDIR => 'd',
        _ => '?',
    });

    s.push(if mode & S_IRUSR != 0 { 'r' } else { '-' });
    s.push(if mode & S_IWUSR != 0 { 'w' } else { '-' });
    s.push(match (mode & S_ISUID != 0, mode & S_IXUSR != 0) {
        (true, true) => 's',
        (true, false) => 'S',
        (false, true) => 'x',
        (false, false) => '-',
    });

    s.push(if mode & S_IRGRP != 0 { 'r' } else { '-' });
    s.push(if mode & S_IWGRP != 0 { 'w' } else { '-' });
    s.push(match (mode & S_ISGID != 0, mode & S_IXGRP != 0) {
        (true, true) => 's',
        (true, false) => 'S',
        (false, true) => 'x',
        (false, false) => '-',
    });

    s.push(if mode & S_IROTH != 0 { 'r' } else { '-' });
    s.push(if mode & S_IWOTH != 0 { 'w' } else { '-' });
    s.push(match (mode & S_ISVTX != 0, mode & S_IXOTH != 0) {
        (true, true) => 't',
        (true, false) => 'T',
        (false, true) => 'x',
        (false, false) => '-',
    });

    s
}

/// Decodes a 10-character (or longer) attribute string into mode bits.
///
/// Unknown type characters decode as regular files, matching what servers
/// that invent attribute letters get from other clients.
pub fn mode_from_attribs(attribs: &str) -> u32 {
    let b = attribs.as_bytes();
    if b.len() < 10 {
        return 0;
    }

    let mut mode = match b[0] {
        b'd' => S_IFDIR,
        b'l' => S_IFLNK,
        b's' => S_IFSOCK,
        b'b' => S_IFBLK,
        b'c' => S_IFCHR,
        b'p' => S_IFIFO,
        _ => S_IFREG,
    };

    if b[1] == b'r' {
        mode |= S_IRUSR;
    }
    if b[2] == b'w' {
        mode |= S_IWUSR;
    }
    if b[3] == b'x' || b[3] == b's' {
        mode |= S_IXUSR;
    }
    if b[3] == b's' || b[3] == b'S' {
        mode |= S_ISUID;
    }

    if b[4] == b'r' {
        mode |= S_IRGRP;
    }
    if b[5] == b'w' {
        mode |= S_IWGRP;
    }
    if b[6] == b'x' || b[6] == b's' {
        mode |= S_IXGRP;
    }
    if b[6] == b's' || b[6] == b'S' {
        mode |= S_ISGID;
    }

    if b[7] == b'r' {
        mode |= S_IROTH;
    }
    if b[8] == b'w' {
        mode |= S_IWOTH;
    }
    if b[9] == b'x' || b[9] == b't' {
        mode |= S_IXOTH;
    }
    if b[9] == b't' || b[9] == b'T' {
        mode |= S_ISVTX;
    }

    mode
}
