// sqlx::migrate! はコンパイル時にマイグレーションを埋め込むため、
// SQLファイルの追加・変更時に再ビルドさせる
fn main() {
    println!("cargo:rerun-if-changed=migrations");
}
