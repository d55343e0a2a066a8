pub(super) const ROOT_LONG_ABOUT: &str = "\
Incremental backups with self-describing archive chains

Chainvault backs up a directory tree into a chain of zip archives. Each backup
stores only the files that changed since the previous one, plus a change log
(diff-log.csv) recording what was created, modified or deleted. The newest
archive that mentions a file holds its last known state.

CORE CONCEPTS:

  Archive chain:
    Archives are named arch1.zip, arch2.zip, ... in the archive directory.
    A higher number is a newer archive. Newer records shadow older ones.

  Diff strategy:
    How a file is compared with its archived state:
    - modification-time: compare mtimes (fast, default choice)
    - content-hash: compare a digest of the content (md5, sha1, sha256, blake2s)
    - raw-content: compare the full content (small, critical files)

  Configuration:
    Backups are defined in a TOML file (chainvault.toml by default, see
    --config). Each definition names a storage directory, an archive directory
    and a strategy.

TYPICAL WORKFLOW:

  1. Define a backup:
     $ chainvault init --name docs --storage ~/docs --archive /mnt/backup/docs \\
         --strategy content-hash --hash sha256

  2. See what changed:
     $ chainvault status

  3. Record the changes in a new archive:
     $ chainvault backup --fingerprint <fingerprint printed by status>

  4. Get a file back:
     $ chainvault restore notes/todo.txt ./todo.txt

EXIT CODES:

  0    Success
  1    status found pending changes
  255  Any error

For detailed help on any command, use:
  chainvault <command> --help
";

pub(super) const INIT_LONG_ABOUT: &str = "\
Add a backup definition to the configuration file

Creates the configuration file if it does not exist. An existing definition with
the same name is never replaced.

The content-hash strategy requires --hash. The archive directory is created on
the first backup that has something to write.
";

pub(super) const STATUS_LONG_ABOUT: &str = "\
Show changes not yet recorded in an archive

Compares the storage directory with the last known state of every file in the
archive chain and lists the differences:

  +  created: not in any archive, or deleted in the newest record
  *  modified: state differs from the newest archived state
  -  deleted: archived, but no longer in the storage directory

Symlinks and special files are skipped. If the archive directory is inside the
storage directory it is skipped too.

A fingerprint of the change set is printed after the list. Pass it to
'chainvault backup --fingerprint' to make sure exactly the reviewed changes
are archived.

Exits with 1 when there are pending changes and 0 when there are none.
";

pub(super) const BACKUP_LONG_ABOUT: &str = "\
Write pending changes as the next archive in the chain

Collects the same change set 'status' shows and writes it as arch<N+1>.zip:

  data/<path>     content of every created or modified file
  diff-log.csv    the change log
  metadata.toml   creation time and strategy

Nothing is written when there are no changes. The archive is assembled in a
temporary file and renamed into place once complete, so an interrupted backup
never leaves a partial archive in the chain.

With --fingerprint, the backup is refused unless the change set matches the
one reviewed with 'status'.
";
