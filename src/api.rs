pub mod auth; // 管理画面Cookieの保存・読み込み
pub mod organizer; // 管理画面からの売上取得
pub mod retry; // 指数バックオフ付きリトライ
pub mod sources; // 名簿・履歴ファイルのダウンロード
