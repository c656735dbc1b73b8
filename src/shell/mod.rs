use crate::*;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;

const HELP: &str = "\
format                        lay down an empty file system
mount / umount                attach or detach the volume
password -s|-c|-r [file]      set, change or remove a password
mkdir <name> / rmdir <name>   create or remove a directory
touch <name> / rm <name>      create or remove a file
cd <name>                     change the current directory
ls                            list the current directory
stat <name>                   show size and blocks of a file
info                          show volume usage
outport <name> <host path>    copy a file out to the host
import <host path> <name>     copy a host file in
help / exit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Line-oriented front-end over one volume. Passphrases are read as the
/// next input line.
pub struct Shell<R: BufRead, W: Write> {
    volume: Arc<Volume>,
    fs: Option<MountedFs>,
    input: R,
    output: W,
}

fn arg<'a>(args: &[&'a str], idx: usize) -> FsResult<&'a str> {
    args.get(idx).copied().ok_or_else(|| new_error!(FsError::InvalidParameter))
}

impl<R: BufRead, W: Write> Shell<R, W> {
    pub fn new(volume: Arc<Volume>, input: R, output: W) -> Self {
        Self {
            volume,
            fs: None,
            input,
            output,
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.fs.is_some()
    }

    /// next input line without its line ending, None at end of input
    fn read_line(&mut self) -> FsResult<Option<String>> {
        let mut line = String::new();
        if io_try!(self.input.read_line(&mut line)) == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    fn prompt(&mut self, what: &str) -> FsResult<String> {
        io_try!(write!(self.output, "{}: ", what));
        io_try!(self.output.flush());
        self.read_line()?.ok_or_else(|| new_error!(FsError::InvalidParameter))
    }

    fn mounted(&mut self) -> FsResult<&mut MountedFs> {
        self.fs.as_mut().ok_or_else(|| new_error!(FsError::NotMounted))
    }

    /// prompt for a file passphrase only when the entry is protected
    fn file_pass(&mut self, name: &str) -> FsResult<Option<String>> {
        let protected = self.mounted()?.lookup(name).map_or(false, |e| e.protected);
        if protected {
            Ok(Some(self.prompt("password")?))
        } else {
            Ok(None)
        }
    }

    fn password(&mut self, args: &[&str]) -> FsResult<()> {
        let file = args.get(1).copied();
        self.mounted()?;
        match arg(args, 0)? {
            "-s" => {
                let new = self.prompt("new password")?;
                let fs = self.mounted()?;
                match file {
                    Some(name) => fs.set_file_password(name, &new),
                    None => fs.set_password(&new),
                }
            }
            "-c" => {
                let old = self.prompt("old password")?;
                let new = self.prompt("new password")?;
                let fs = self.mounted()?;
                match file {
                    Some(name) => fs.change_file_password(name, &old, &new),
                    None => fs.change_password(&old, &new),
                }
            }
            "-r" => {
                let old = self.prompt("password")?;
                let fs = self.mounted()?;
                match file {
                    Some(name) => fs.remove_file_password(name, &old),
                    None => fs.remove_password(&old),
                }
            }
            _ => Err(new_error!(FsError::InvalidParameter)),
        }
    }

    fn ok(&mut self) -> FsResult<Flow> {
        io_try!(writeln!(self.output, "ok"));
        Ok(Flow::Continue)
    }

    /// Run one command line.
    pub fn execute(&mut self, line: &str) -> FsResult<Flow> {
        let mut words = line.split_whitespace();
        let Some(cmd) = words.next() else {
            return Ok(Flow::Continue);
        };
        let args: Vec<&str> = words.collect();

        match cmd {
            "format" => {
                if self.fs.is_some() {
                    return Err(new_error!(FsError::AlreadyMounted));
                }
                format(&self.volume)?;
                self.ok()
            }
            "mount" => {
                if self.fs.is_some() {
                    return Err(new_error!(FsError::AlreadyMounted));
                }
                let pass = if MountedFs::is_protected(&self.volume)? {
                    Some(self.prompt("password")?)
                } else {
                    None
                };
                self.fs = Some(MountedFs::mount(self.volume.clone(), pass.as_deref())?);
                self.ok()
            }
            "umount" => {
                let fs = self.fs.take().ok_or_else(|| new_error!(FsError::NotMounted))?;
                fs.unmount();
                self.ok()
            }
            "password" => {
                self.password(&args)?;
                self.ok()
            }
            "mkdir" => {
                self.mounted()?.mkdir(arg(&args, 0)?)?;
                self.ok()
            }
            "rmdir" => {
                self.mounted()?.rmdir(arg(&args, 0)?)?;
                self.ok()
            }
            "touch" => {
                self.mounted()?.touch(arg(&args, 0)?)?;
                self.ok()
            }
            "rm" => {
                self.mounted()?.rm(arg(&args, 0)?)?;
                self.ok()
            }
            "cd" => {
                self.mounted()?.cd(arg(&args, 0)?)?;
                self.ok()
            }
            "ls" => {
                let entries = self.mounted()?.ls();
                for e in entries {
                    let tp = match e.tp {
                        FileType::Dir => 'd',
                        FileType::Reg => '-',
                    };
                    let lock = if e.protected { '*' } else { ' ' };
                    io_try!(writeln!(self.output, "{}{} {:>5} {}", tp, lock, e.inumber, e.name));
                }
                Ok(Flow::Continue)
            }
            "stat" => {
                let md = self.mounted()?.stat_file(arg(&args, 0)?)?;
                io_try!(writeln!(
                    self.output,
                    "inode {} size {} blocks {}",
                    md.inumber, md.size, md.blocks,
                ));
                Ok(Flow::Continue)
            }
            "info" => {
                let info = self.mounted()?.finfo();
                io_try!(writeln!(
                    self.output,
                    "magic {:#x}, block size {}\nblocks {} ({} free)\ninodes {} ({} free)\ndirs {} ({} free)\nprotected {}",
                    info.magic, info.bsize,
                    info.blocks, info.bfree,
                    info.files, info.ffree,
                    info.dirs, info.dfree,
                    info.protected,
                ));
                Ok(Flow::Continue)
            }
            "outport" => {
                let name = arg(&args, 0)?;
                let host = arg(&args, 1)?;
                let pass = self.file_pass(name)?;
                let n = self.mounted()?.outport(name, Path::new(host), pass.as_deref())?;
                io_try!(writeln!(self.output, "{} bytes", n));
                Ok(Flow::Continue)
            }
            "import" => {
                let host = arg(&args, 0)?;
                let name = arg(&args, 1)?;
                let pass = self.file_pass(name)?;
                let n = self.mounted()?.import(Path::new(host), name, pass.as_deref())?;
                io_try!(writeln!(self.output, "{} bytes", n));
                Ok(Flow::Continue)
            }
            "help" => {
                io_try!(writeln!(self.output, "{}", HELP));
                Ok(Flow::Continue)
            }
            "exit" => Ok(Flow::Exit),
            _ => {
                io_try!(writeln!(self.output, "unknown command: {}", cmd));
                Ok(Flow::Continue)
            }
        }
    }

    /// Read and run commands until `exit` or end of input. Command
    /// failures are reported and do not stop the loop.
    pub fn run(&mut self) -> FsResult<()> {
        loop {
            let cwd = self.fs.as_ref().map_or("-", |fs| fs.cwd_name()).to_string();
            io_try!(write!(self.output, "tinyfs:{}> ", cwd));
            io_try!(self.output.flush());

            let Some(line) = self.read_line()? else {
                break;
            };
            match self.execute(&line) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit) => break,
                Err(e) => io_try!(writeln!(self.output, "error: {}", e)),
            }
        }

        if let Some(fs) = self.fs.take() {
            fs.unmount();
        }
        Ok(())
    }
}
