// SPDX-License-Identifier: MIT

fn main() {
    stagexec::observability::init();
    stagexec::launch(stagexec::LaunchConfig::embedded())
}
